mod common;

use bioscope_dl::{Downloader, Error, manifest};
use common::{ITEM_ID, RESOURCE_PATH, Route, Stream, StubServer};

const MASTER: &str = r#"#EXTM3U
#EXT-X-VERSION:4
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360,FRAME-RATE=25.000,CODECS="avc1.4d401e,mp4a.40.2"
abc123_360p.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720,FRAME-RATE=25.000,CODECS="avc1.4d401f,mp4a.40.2"
abc123_720p.m3u8
"#;

#[tokio::test]
async fn master_playlist() -> Result<(), Box<dyn std::error::Error>> {
    let server = StubServer::new().await;
    server.route(
        "/vod/vod/a/b/abc123/abc123.m3u8",
        Route::Body(MASTER.into()),
    );

    let options = server.options();
    let master = manifest::fetch_master_playlist(&options.client()?, &options, ITEM_ID).await?;

    let uris = master
        .variants
        .iter()
        .map(|x| x.uri.as_str())
        .collect::<Vec<_>>();
    assert_eq!(uris, vec!["abc123_360p.m3u8", "abc123_720p.m3u8"]);
    Ok(())
}

#[tokio::test]
async fn media_playlist_instead_of_master() {
    let server = StubServer::new().await;
    server.route(
        "/vod/vod/a/b/abc123/abc123.m3u8",
        Route::Body("#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\nabc123_1.ts\n#EXT-X-ENDLIST\n".into()),
    );

    let options = server.options();
    let result =
        manifest::fetch_master_playlist(&options.client().unwrap(), &options, ITEM_ID).await;
    assert!(matches!(result, Err(Error::Manifest(_))));
}

#[tokio::test]
async fn missing_playlist() {
    let server = StubServer::new().await;

    let options = server.options();
    let result =
        manifest::fetch_master_playlist(&options.client().unwrap(), &options, ITEM_ID).await;
    assert!(matches!(result, Err(Error::HttpStatus(404))));

    let result =
        manifest::fetch_master_playlist(&options.client().unwrap(), &options, "ab").await;
    assert!(matches!(result, Err(Error::InvalidItemId(_))));
}

#[tokio::test]
async fn playlist_statuses_past_599_are_errors() {
    let server = StubServer::new().await;
    server.route(
        "/vod/vod/a/b/abc123/abc123.m3u8",
        Route::StatusBody(600, MASTER.into()),
    );

    let options = server.options();
    let result =
        manifest::fetch_master_playlist(&options.client().unwrap(), &options, ITEM_ID).await;
    assert!(matches!(result, Err(Error::HttpStatus(600))));
}

#[tokio::test]
async fn media_playlist_download() -> Result<(), Box<dyn std::error::Error>> {
    let server = StubServer::new().await;
    let stream = Stream::serve(&server, &[48, 80, 32]);

    // the same segments, written as a playlist with relative key uris
    let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:4\n#EXT-X-TARGETDURATION:10\n#EXT-X-MEDIA-SEQUENCE:10\n");

    for (i, segment) in stream.playlist.segments.iter().flatten().enumerate() {
        let key = segment.key.as_ref().unwrap();
        text.push_str(&format!("#EXT-X-KEY:METHOD=AES-128,URI=\"/keys/{}\"", i));

        if let Some(iv) = &key.iv {
            text.push_str(&format!(",IV={}", iv));
        }

        text.push_str(&format!(
            "\n#EXTINF:10.0,\n#EXT-X-BYTERANGE:{}@{}\n{}\n",
            segment.limit, segment.offset, segment.uri
        ));
    }
    text.push_str("#EXT-X-ENDLIST\n");

    server.route("/vod/vod/a/b/abc123/abc123_720p.m3u8", Route::Body(text.into()));

    let options = server.options();
    let playlist =
        manifest::fetch_media_playlist(&options.client()?, &options, "abc123_720p.m3u8").await?;
    assert_eq!(playlist, stream.playlist);

    let mut sink = Vec::new();
    Downloader::new(&options)?
        .download(&mut sink, &playlist)
        .await?;

    assert_eq!(sink, stream.plaintext);
    assert_eq!(server.hits(RESOURCE_PATH), 3);
    Ok(())
}

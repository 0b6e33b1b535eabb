use crate::{
    Error, Options, Result,
    fetch::{item_path, shard},
    playlist::{Key, Playlist, Segment},
};
use bytes::Bytes;
use log::debug;
use reqwest::{Client, Url, header};

/// Fetches `<id>.m3u8`, the master playlist of an item.
pub async fn fetch_master_playlist(
    client: &Client,
    options: &Options,
    item_id: &str,
) -> Result<m3u8_rs::MasterPlaylist> {
    let (a, b) = shard(item_id).ok_or_else(|| Error::InvalidItemId(item_id.to_owned()))?;
    let url = options
        .content_base
        .join(&format!("{}/{}/{}/{}.m3u8", a, b, item_id, item_id))?;
    let bytes = fetch_bytes(client, options, url).await?;

    match m3u8_rs::parse_playlist_res(&bytes) {
        Ok(m3u8_rs::Playlist::MasterPlaylist(x)) => Ok(x),
        Ok(m3u8_rs::Playlist::MediaPlaylist(_)) => Err(Error::Manifest(
            "expected a master playlist, found a media playlist".to_owned(),
        )),
        Err(e) => Err(Error::Manifest(e.to_string())),
    }
}

/// Fetches the media playlist of a variant, e.g. `abc123_720p.m3u8`.
pub async fn fetch_media_playlist(client: &Client, options: &Options, uri: &str) -> Result<Playlist> {
    let url = options.content_base.join(&item_path(uri)?)?;
    let bytes = fetch_bytes(client, options, url.clone()).await?;

    match m3u8_rs::parse_playlist_res(&bytes) {
        Ok(m3u8_rs::Playlist::MediaPlaylist(x)) => Playlist::from_media_playlist(&x, Some(&url)),
        Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => Err(Error::Manifest(
            "expected a media playlist, found a master playlist".to_owned(),
        )),
        Err(e) => Err(Error::Manifest(e.to_string())),
    }
}

async fn fetch_bytes(client: &Client, options: &Options, url: Url) -> Result<Bytes> {
    debug!("Fetching playlist {}", url);

    let response = client
        .get(url)
        .header(header::REFERER, &options.referer)
        .header(header::CONNECTION, "keep-alive")
        .send()
        .await?;
    let status = response.status();

    if status.as_u16() >= 400 {
        return Err(Error::HttpStatus(status.as_u16()));
    }

    Ok(response.bytes().await?)
}

impl Playlist {
    /// Converts a parsed media playlist. Relative key uris are resolved
    /// against `base`.
    ///
    /// Every segment needs a byte range. A range without offset continues
    /// right after the previous range of the same uri. A key applies to all
    /// following segments until the next `EXT-X-KEY`.
    pub fn from_media_playlist(m3u8: &m3u8_rs::MediaPlaylist, base: Option<&Url>) -> Result<Self> {
        let mut segments = Vec::with_capacity(m3u8.segments.len());
        let mut key = None;
        let mut previous: Option<(&str, u64)> = None;

        for (i, segment) in m3u8.segments.iter().enumerate() {
            if let Some(x) = &segment.key {
                key = match &x.method {
                    m3u8_rs::KeyMethod::None => None,
                    m3u8_rs::KeyMethod::AES128 => {
                        let uri = x.uri.as_ref().ok_or_else(|| {
                            Error::Manifest("AES-128 key without uri".to_owned())
                        })?;

                        Some(Key {
                            uri: match base {
                                Some(base) => base.join(uri)?.to_string(),
                                None => uri.to_owned(),
                            },
                            iv: x.iv.clone(),
                        })
                    }
                    m3u8_rs::KeyMethod::SampleAES => {
                        return Err(Error::UnsupportedEncryption("SAMPLE-AES".to_owned()));
                    }
                    m3u8_rs::KeyMethod::Other(x) => {
                        return Err(Error::UnsupportedEncryption(x.to_owned()));
                    }
                };
            }

            let range = segment.byte_range.as_ref().ok_or_else(|| {
                Error::Manifest(format!("segment {} has no byte range", segment.uri))
            })?;

            let offset = match (range.offset, previous) {
                (Some(offset), _) => offset,
                (None, Some((uri, end))) if uri == segment.uri => end,
                (None, _) => {
                    return Err(Error::Manifest(format!(
                        "byte range of segment {} has no offset and no preceding range",
                        segment.uri
                    )));
                }
            };

            let end = offset.checked_add(range.length).ok_or_else(|| {
                Error::Manifest(format!("byte range of segment {} overflows", segment.uri))
            })?;
            let sequence = m3u8
                .media_sequence
                .checked_add(i as u64)
                .ok_or_else(|| Error::Manifest("media sequence overflows".to_owned()))?;

            previous = Some((segment.uri.as_str(), end));
            segments.push(Some(Segment {
                uri: segment.uri.to_owned(),
                offset,
                limit: range.length,
                sequence,
                key: key.clone(),
            }));
        }

        Ok(Self { segments })
    }
}

use crate::{Error, Options, Result, playlist::Segment};
use bytes::Bytes;
use log::debug;
use reqwest::{Client, Url, header};

/// Path of a resource below the content base, sharded by its item id.
///
/// `abc123_720p.ts` belongs to item `abc123` and lives at
/// `a/b/abc123/abc123_720p.ts`.
pub fn item_path(uri: &str) -> Result<String> {
    let item_id = uri
        .rfind('_')
        .map(|x| &uri[..x])
        .ok_or_else(|| Error::InvalidItemId(uri.to_owned()))?;

    match shard(item_id) {
        Some((a, b)) => Ok(format!("{}/{}/{}/{}", a, b, item_id, uri)),
        None => Err(Error::InvalidItemId(uri.to_owned())),
    }
}

/// First two characters of an item id which is at least three characters long.
pub(crate) fn shard(item_id: &str) -> Option<(char, char)> {
    let mut chars = item_id.chars();

    match (chars.next(), chars.next(), chars.next()) {
        (Some(a), Some(b), Some(_)) => Some((a, b)),
        _ => None,
    }
}

#[derive(Clone)]
pub struct SegmentFetcher {
    client: Client,
    content_base: Url,
    referer: String,
}

impl SegmentFetcher {
    pub fn new(client: Client, options: &Options) -> Self {
        Self {
            client,
            content_base: options.content_base.clone(),
            referer: options.referer.clone(),
        }
    }

    pub fn url(&self, segment: &Segment) -> Result<Url> {
        Ok(self.content_base.join(&item_path(&segment.uri)?)?)
    }

    /// Downloads the byte range of a segment. Anything but exactly `limit`
    /// bytes is rejected, so truncated or redirected transfers never pass as
    /// a segment.
    pub async fn fetch(&self, segment: &Segment) -> Result<Bytes> {
        let url = self.url(segment)?;

        if segment.limit == 0 {
            return Ok(Bytes::new());
        }

        debug!("Fetching {} ({})", url, segment.range_header().to_str().unwrap_or_default());

        let response = self
            .client
            .get(url)
            .header(header::REFERER, &self.referer)
            .header(header::CONNECTION, "keep-alive")
            .header(header::RANGE, segment.range_header())
            .send()
            .await?;
        let status = response.status();

        if status.as_u16() >= 400 {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        if let Some(got) = response.content_length()
            && got != segment.limit
        {
            return Err(Error::ContentLength {
                expected: segment.limit,
                got,
            });
        }

        let data = response.bytes().await?;

        if data.len() as u64 != segment.limit {
            return Err(Error::ContentLength {
                expected: segment.limit,
                got: data.len() as u64,
            });
        }

        Ok(data)
    }
}

use crate::{Error, Result};
use reqwest::header::HeaderValue;
use serde::Serialize;

/// Key reference of an encrypted segment.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Key {
    pub uri: String,
    /// Hex string as written in the playlist, optionally `0x` prefixed.
    pub iv: Option<String>,
}

/// One byte-range addressed, separately encrypted chunk of a stream.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Segment {
    pub uri: String,
    pub offset: u64,
    pub limit: u64,
    /// Media sequence number, used as iv when the key has none.
    pub sequence: u64,
    pub key: Option<Key>,
}

impl Segment {
    pub fn range_header(&self) -> HeaderValue {
        HeaderValue::from_str(&format!(
            "bytes={}-{}",
            self.offset,
            self.offset.saturating_add(self.limit).saturating_sub(1)
        ))
        .expect("digits and '-' are valid header characters")
    }
}

/// Ordered segments of one rendition. `None` entries are gaps which are
/// skipped but still count towards indices.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Playlist {
    pub segments: Vec<Option<Segment>>,
}

/// Where a download has to restart from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resume {
    /// Index of the first segment that is not completely written yet.
    From(usize),
    /// Every byte has already been written.
    Complete,
}

impl Playlist {
    pub fn new(segments: Vec<Option<Segment>>) -> Self {
        Self { segments }
    }

    /// Number of entries, gaps included.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Present segments starting at entry `start`, with their entry index.
    pub fn present_from(&self, start: usize) -> impl Iterator<Item = (usize, &Segment)> {
        self.segments
            .iter()
            .enumerate()
            .skip(start)
            .filter_map(|(i, x)| x.as_ref().map(|x| (i, x)))
    }

    /// Total number of bytes the whole playlist decrypts to.
    pub fn content_length(&self) -> u64 {
        self.present_from(0)
            .fold(0_u64, |sum, (_, x)| sum.saturating_add(x.limit))
    }

    /// Number of bytes the entries before `index` decrypt to.
    pub fn content_length_before(&self, index: usize) -> u64 {
        self.present_from(0)
            .take_while(|(i, _)| *i < index)
            .fold(0_u64, |sum, (_, x)| sum.saturating_add(x.limit))
    }

    /// Maps an already written byte count to the segment the download must
    /// restart from. A segment which was only partially written is fetched
    /// again in full.
    pub fn start_index_for_byte_count(&self, n: u64) -> Result<Resume> {
        let mut length = 0_u64;

        for (i, segment) in self.present_from(0) {
            length = length.saturating_add(segment.limit);

            if length > n {
                return Ok(Resume::From(i));
            }
        }

        if n > length {
            return Err(Error::OutOfRange);
        }

        Ok(Resume::Complete)
    }
}

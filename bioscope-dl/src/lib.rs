//! Download byte-range addressed, AES-128 encrypted HLS segments and write
//! them decrypted, in playlist order, into a single stream.
//!
//! Downloads can be resumed from the number of bytes already written, see
//! [`Downloader::download_after_bytes`]. Resumption works on whole segments:
//! the segment containing the resume position is downloaded again in full.
//!
//! ## Example
//!
//! ```no_run
//! use bioscope_dl::{Downloader, Options, manifest};
//!
//! # async fn run() -> bioscope_dl::Result<()> {
//! let options = Options::default();
//! let client = options.client()?;
//! let playlist = manifest::fetch_media_playlist(&client, &options, "abc123_720p.m3u8").await?;
//!
//! let mut file = tokio::fs::OpenOptions::new()
//!     .create(true)
//!     .append(true)
//!     .open("abc123_720p.mp4")
//!     .await?;
//! let written = file.metadata().await?.len();
//!
//! Downloader::new(&options)?
//!     .download_after_bytes(&mut file, &playlist, written)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod decrypt;
mod error;
mod fetch;
mod keys;
pub mod manifest;
mod options;
mod pipeline;
mod playlist;

pub use decrypt::{Decrypter, cbc_decrypt, sequence_iv};
pub use error::{Error, Result};
pub use fetch::{SegmentFetcher, item_path};
pub use keys::{KeyStore, parse_iv};
pub use options::{CONTENT_BASE, KEY_SCHEME, Options, REFERER, USER_AGENT};
pub use pipeline::Downloader;
pub use playlist::{Key, Playlist, Resume, Segment};
pub use reqwest;
pub use tokio_util::sync::CancellationToken;

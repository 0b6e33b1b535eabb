use thiserror::Error;

/// The error type returned by every fallible operation of this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid item id in '{0}'")]
    InvalidItemId(String),

    #[error("Invalid hex iv: {0}")]
    InvalidIv(#[from] hex::FromHexError),

    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Out of range")]
    OutOfRange,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Http status code {0}")]
    HttpStatus(u16),

    #[error("Expected length {expected}, got {got}")]
    ContentLength { expected: u64, got: u64 },

    #[error("Ciphertext length {0} is not a multiple of the AES block size")]
    UnalignedCiphertext(usize),

    #[error("Invalid key length: expected 16, 24 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Invalid iv length: expected 16 bytes, got {0}")]
    InvalidIvLength(usize),

    #[error("Invalid playlist: {0}")]
    Manifest(String),

    #[error("{0} decryption is not supported")]
    UnsupportedEncryption(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Download cancelled")]
    Cancelled,

    #[error("Pipeline stage aborted: {0}")]
    Stage(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

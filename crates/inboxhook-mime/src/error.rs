//! Error types for content decoding.

/// Result type alias for decoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Decoding error types.
///
/// The public entry points of this crate never surface these to callers;
/// they are logged and the input degrades to a best-effort result.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid transfer or word encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}

//! Error types for the IMAP client.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Protocol parsing error.
    #[error("Protocol error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server returned NO response.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD response.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns true if the connection can no longer be used.
    ///
    /// NO, BAD and parse errors fail one command but leave the session
    /// usable. Everything else means the transport is gone or out of sync.
    #[must_use]
    pub const fn is_connection_failure(&self) -> bool {
        !matches!(self, Self::No(_) | Self::Bad(_) | Self::Parse { .. })
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failure_classes() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "closed");
        assert!(Error::Io(eof).is_connection_failure());
        assert!(Error::Bye("shutting down".into()).is_connection_failure());
        assert!(Error::Timeout(Duration::from_secs(30)).is_connection_failure());
        assert!(Error::Protocol("line too long".into()).is_connection_failure());
        assert!(!Error::No("search failed".into()).is_connection_failure());
        assert!(!Error::Bad("bad syntax".into()).is_connection_failure());
        assert!(
            !Error::Parse {
                position: 3,
                message: "x".into()
            }
            .is_connection_failure()
        );
    }
}

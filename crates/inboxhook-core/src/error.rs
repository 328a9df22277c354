//! Error types for the watcher core.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] inboxhook_imap::Error),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The automation collaborator failed for a link.
    #[error("Automation failed for {link}: {source}")]
    Automation {
        /// The link that was being automated.
        link: String,
        /// What the collaborator reported.
        #[source]
        source: DispatchError,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Startup configuration problems. All of them need an operator fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required key is absent or blank.
    #[error("{0} is required")]
    Missing(&'static str),

    /// A key is present but cannot be used.
    #[error("{key} is invalid: {reason}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A pipe-delimited target list has no usable entries.
    #[error("{0} must contain at least one non-empty entry")]
    EmptyTargets(&'static str),

    /// Both or neither automation collaborators are configured.
    #[error("exactly one of AUTOMATION_COMMAND or AUTOMATION_ENDPOINT must be set")]
    AutomationTarget,
}

/// Failure reported by a page-automation collaborator.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The collaborator ran and reported failure.
    #[error("{0}")]
    Failed(String),

    /// The collaborator did not answer in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The collaborator could not be started or reached.
    #[error("could not reach automation: {0}")]
    Unavailable(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_automation_error_carries_link() {
        let err = Error::Automation {
            link: "https://example.test/a".to_string(),
            source: DispatchError::Failed("button not found".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Automation failed for https://example.test/a: button not found"
        );
    }

    #[test]
    fn test_config_error_messages() {
        assert_eq!(ConfigError::Missing("IMAP_HOST").to_string(), "IMAP_HOST is required");
        assert_eq!(
            ConfigError::EmptyTargets("TARGET_EMAIL_SUBJECTS").to_string(),
            "TARGET_EMAIL_SUBJECTS must contain at least one non-empty entry"
        );
    }
}

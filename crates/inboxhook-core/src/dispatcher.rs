//! Hands action links to the page-automation collaborator.

#![allow(async_fn_in_trait)]

use crate::error::{DispatchError, Error, Result};
use crate::message::ActionLink;

/// External collaborator that performs the one-time page action.
///
/// Implementations own their timeouts and any internal retries.
pub trait PageAutomation {
    /// Loads `url` and performs the action.
    async fn automate(&self, url: &str) -> std::result::Result<(), DispatchError>;
}

/// What happens to `\Seen` when automation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeenPolicy {
    /// Leave the message seen. Links are usually single-use.
    #[default]
    KeepSeen,
    /// Remove `\Seen` so a later cycle picks the message up again.
    RevertToUnseen,
}

impl SeenPolicy {
    /// Parses `keep` or `revert`, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keep" => Some(Self::KeepSeen),
            "revert" => Some(Self::RevertToUnseen),
            _ => None,
        }
    }
}

/// Invokes the collaborator and attaches the link to any failure.
#[derive(Debug)]
pub struct Dispatcher<A> {
    automation: A,
}

impl<A: PageAutomation> Dispatcher<A> {
    /// Creates a dispatcher over `automation`.
    pub const fn new(automation: A) -> Self {
        Self { automation }
    }

    /// Returns the wrapped collaborator.
    pub const fn automation(&self) -> &A {
        &self.automation
    }

    /// Runs the automation for `link` once. No retry on failure.
    pub async fn dispatch(&self, link: &ActionLink) -> Result<()> {
        tracing::info!(link = %link, "dispatching action link");
        match self.automation.automate(link.as_str()).await {
            Ok(()) => {
                tracing::info!(link = %link, "automation succeeded");
                Ok(())
            }
            Err(source) => Err(Error::Automation {
                link: link.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::message::DecodedEmail;

    struct Scripted {
        fail: bool,
        calls: Mutex<Vec<String>>,
    }

    impl PageAutomation for Scripted {
        async fn automate(&self, url: &str) -> std::result::Result<(), DispatchError> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.fail {
                Err(DispatchError::Failed("confirm button not found".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn link() -> ActionLink {
        let email = DecodedEmail {
            subject: String::new(),
            from: String::new(),
            body: String::new(),
            links: vec!["https://example.test/update-primary-location?t=1".to_string()],
        };
        ActionLink::find(&email, "update-primary-location").unwrap()
    }

    #[test]
    fn test_seen_policy_parse() {
        assert_eq!(SeenPolicy::parse("keep"), Some(SeenPolicy::KeepSeen));
        assert_eq!(SeenPolicy::parse(" Revert "), Some(SeenPolicy::RevertToUnseen));
        assert_eq!(SeenPolicy::parse("retry"), None);
        assert_eq!(SeenPolicy::default(), SeenPolicy::KeepSeen);
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let dispatcher = Dispatcher::new(Scripted {
            fail: false,
            calls: Mutex::new(Vec::new()),
        });
        dispatcher.dispatch(&link()).await.unwrap();
        assert_eq!(
            *dispatcher.automation().calls.lock().unwrap(),
            vec!["https://example.test/update-primary-location?t=1"]
        );
    }

    #[tokio::test]
    async fn test_dispatch_failure_wraps_link_and_does_not_retry() {
        let dispatcher = Dispatcher::new(Scripted {
            fail: true,
            calls: Mutex::new(Vec::new()),
        });
        let err = dispatcher.dispatch(&link()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Automation { ref link, .. } if link.contains("update-primary-location")
        ));
        assert_eq!(dispatcher.automation().calls.lock().unwrap().len(), 1);
    }
}

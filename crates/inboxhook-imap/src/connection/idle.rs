//! IMAP IDLE command support (RFC 2177).
//!
//! IDLE lets the server push mailbox changes instead of the client polling.

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use super::client::{Client, Selected, status_to_result};
use super::framed::ResponseAccumulator;
use crate::command::Command;
use crate::parser::{FetchItem, Response, ResponseParser, UntaggedResponse};
use crate::types::{Flags, SeqNum, Status};
use crate::{Error, Result};

/// Event received during IDLE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleEvent {
    /// New message count (EXISTS response).
    Exists(u32),
    /// Recent count changed.
    Recent(u32),
    /// Message expunged (EXPUNGE response).
    Expunge(SeqNum),
    /// Message flags changed (FETCH response).
    FlagsChanged {
        /// Message sequence number.
        seq: SeqNum,
        /// Updated flags.
        flags: Flags,
    },
    /// Server status chatter such as `* OK still here`.
    KeepAlive,
    /// The wait elapsed without any server data.
    Timeout,
}

impl IdleEvent {
    /// Returns true if the event announces new mail.
    #[must_use]
    pub const fn is_new_mail(&self) -> bool {
        matches!(self, Self::Exists(_) | Self::Recent(_))
    }
}

/// Handle for an active IDLE session.
///
/// Borrows the client for as long as IDLE is active. Call [`wait`] for
/// events and [`done`] to leave IDLE before issuing other commands.
///
/// [`wait`]: IdleHandle::wait
/// [`done`]: IdleHandle::done
pub struct IdleHandle<'a, S> {
    client: &'a mut Client<S, Selected>,
    tag: String,
    accumulator: ResponseAccumulator,
}

impl<'a, S> IdleHandle<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(client: &'a mut Client<S, Selected>, tag: String) -> Self {
        let accumulator = ResponseAccumulator::new(tag.clone());
        Self {
            client,
            tag,
            accumulator,
        }
    }

    /// Waits for a server event, or returns [`IdleEvent::Timeout`] after
    /// `duration`.
    ///
    /// RFC 2177 asks clients to re-issue IDLE at least every 29 minutes.
    pub async fn wait(&mut self, duration: Duration) -> Result<IdleEvent> {
        match timeout(duration, self.client.stream.read_response()).await {
            Ok(Ok(response)) => {
                self.accumulator.observe(&response);
                self.parse_event(&response)
            }
            Ok(Err(e)) => Err(self.accumulator.explain(e)),
            Err(_) => Ok(IdleEvent::Timeout),
        }
    }

    fn parse_event(&self, response: &[u8]) -> Result<IdleEvent> {
        match ResponseParser::parse(response)? {
            Response::Untagged(untagged) => Ok(match untagged {
                UntaggedResponse::Exists(n) => IdleEvent::Exists(n),
                UntaggedResponse::Recent(n) => IdleEvent::Recent(n),
                UntaggedResponse::Expunge(seq) => IdleEvent::Expunge(seq),
                UntaggedResponse::Fetch { seq, items } => {
                    let flags = items
                        .into_iter()
                        .find_map(|item| match item {
                            FetchItem::Flags(f) => Some(f),
                            _ => None,
                        })
                        .unwrap_or_default();
                    IdleEvent::FlagsChanged { seq, flags }
                }
                UntaggedResponse::Bye { text, .. } => return Err(Error::Bye(text)),
                _ => IdleEvent::KeepAlive,
            }),
            Response::Continuation { .. } => Err(Error::Protocol(
                "unexpected continuation during IDLE".to_string(),
            )),
            Response::Tagged {
                tag, status, text, ..
            } => {
                if tag.as_str() != self.tag {
                    return Err(Error::Protocol(format!(
                        "unexpected tag {} during IDLE",
                        tag.as_str()
                    )));
                }
                // The server ended IDLE on its own.
                match status {
                    Status::Ok => Err(Error::Protocol("server terminated IDLE".to_string())),
                    other => status_to_result(other, text).map(|()| IdleEvent::KeepAlive),
                }
            }
        }
    }

    /// Leaves IDLE by sending DONE and reading the tagged completion.
    pub async fn done(self) -> Result<()> {
        self.client
            .stream
            .write_command(&Command::Done.serialize(""))
            .await?;
        let responses = self.client.read_until_tagged(&self.tag).await?;
        Client::<S, Selected>::check_tagged_ok(&responses, &self.tag)
    }
}

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Enters IDLE.
    ///
    /// Check [`supports_idle`](Client::supports_idle) first; servers without
    /// the capability answer BAD.
    pub async fn idle(&mut self) -> Result<IdleHandle<'_, S>> {
        let tag = self.send(&Command::Idle).await?;

        // Untagged data may precede the continuation.
        loop {
            let response = self.stream.read_response_within(self.io_timeout).await?;
            if response.starts_with(b"+") {
                break;
            }
            match ResponseParser::parse(&response)? {
                Response::Tagged { status, text, .. } => {
                    status_to_result(status, text)?;
                    return Err(Error::Protocol("IDLE completed immediately".to_string()));
                }
                Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                    return Err(Error::Bye(text));
                }
                Response::Untagged(_) => self.note_unsolicited(&response),
                Response::Continuation { .. } => break,
            }
        }

        Ok(IdleHandle::new(self, tag))
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
    use tokio_test::io::{Builder, Mock};

    use super::*;
    use crate::types::MailboxStatus;

    async fn selected(mock: Mock) -> Client<Mock, Selected> {
        let client = Client::from_stream(mock).await.unwrap();
        client.transition(Selected::new("INBOX", MailboxStatus::default()))
    }

    #[test]
    fn test_is_new_mail() {
        assert!(IdleEvent::Exists(3).is_new_mail());
        assert!(IdleEvent::Recent(1).is_new_mail());
        assert!(!IdleEvent::KeepAlive.is_new_mail());
        assert!(!IdleEvent::Timeout.is_new_mail());
    }

    #[tokio::test]
    async fn test_idle_exists_then_done() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"W0000 IDLE\r\n")
            .read(b"+ idling\r\n")
            .read(b"* 4 EXISTS\r\n")
            .write(b"DONE\r\n")
            .read(b"W0000 OK IDLE terminated\r\n")
            .build();
        let mut client = selected(mock).await;
        let mut handle = client.idle().await.unwrap();
        let event = handle.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(event, IdleEvent::Exists(4));
        handle.done().await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_keepalive() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"W0000 IDLE\r\n")
            .read(b"+ idling\r\n")
            .read(b"* OK Still here\r\n")
            .build();
        let mut client = selected(mock).await;
        let mut handle = client.idle().await.unwrap();
        let event = handle.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(event, IdleEvent::KeepAlive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_wait_times_out() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"W0000 IDLE\r\n")
            .read(b"+ idling\r\n")
            .wait(Duration::from_secs(600))
            .build();
        let mut client = selected(mock).await;
        let mut handle = client.idle().await.unwrap();
        let event = handle.wait(Duration::from_secs(60)).await.unwrap();
        assert_eq!(event, IdleEvent::Timeout);
    }

    #[tokio::test]
    async fn test_idle_bye_is_error() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"W0000 IDLE\r\n")
            .read(b"+ idling\r\n")
            .read(b"* BYE Autologout\r\n")
            .build();
        let mut client = selected(mock).await;
        let mut handle = client.idle().await.unwrap();
        let err = handle.wait(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, Error::Bye(ref text) if text == "Autologout"));
        assert!(err.is_connection_failure());
    }

    #[tokio::test]
    async fn test_idle_rejected() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"W0000 IDLE\r\n")
            .read(b"W0000 BAD unknown command\r\n")
            .build();
        let mut client = selected(mock).await;
        let err = client.idle().await.err().unwrap();
        assert!(matches!(err, Error::Bad(_)));
    }
}

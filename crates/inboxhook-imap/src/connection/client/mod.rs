//! Type-state IMAP client connection.
//!
//! `NotAuthenticated` → `Authenticated` → `Selected`. Each state only
//! exposes the commands valid in it; transitions consume the client.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

pub use self::states::{Authenticated, NotAuthenticated, Selected};
use super::framed::{FramedStream, ResponseAccumulator};
use crate::command::{Command, TagGenerator};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, ResponseCode, Status};
use crate::{Error, Result};

/// Default bound on each server response while a command is outstanding.
pub(crate) const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// IMAP client connection with type-state.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tag_gen: TagGenerator,
    pub(crate) capabilities: Vec<Capability>,
    pub(crate) io_timeout: Duration,
    pub(crate) notifications: u32,
    pub(crate) state: State,
}

impl<S, State: std::fmt::Debug> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tag_gen", &self.tag_gen)
            .field("capabilities", &self.capabilities)
            .field("notifications", &self.notifications)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the server capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Checks if the server has a specific capability.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Returns true if the server supports IDLE (RFC 2177).
    #[must_use]
    pub fn supports_idle(&self) -> bool {
        self.has_capability(&Capability::Idle)
    }

    /// Returns true if LOGIN is refused until TLS is active.
    #[must_use]
    pub fn login_disabled(&self) -> bool {
        self.has_capability(&Capability::LoginDisabled)
    }

    /// Sets the bound on each server response while a command is outstanding.
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Returns and resets the number of unsolicited EXISTS/RECENT responses
    /// seen since the last call.
    pub const fn take_notifications(&mut self) -> u32 {
        let n = self.notifications;
        self.notifications = 0;
        n
    }

    /// Sends NOOP. Servers use the reply to deliver pending EXISTS updates.
    pub async fn noop(&mut self) -> Result<()> {
        let tag = self.send(&Command::Noop).await?;
        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)
    }

    /// Sends CAPABILITY and stores the result.
    pub async fn capability(&mut self) -> Result<Vec<Capability>> {
        let tag = self.send(&Command::Capability).await?;
        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;
        self.absorb_capabilities(&responses);
        Ok(self.capabilities.clone())
    }

    /// Logs out. The server's BYE and the connection close are expected.
    pub async fn logout(mut self) -> Result<()> {
        let tag = self.send(&Command::Logout).await?;
        match self.read_until_tagged(&tag).await {
            Ok(_) | Err(Error::Bye(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Serializes and writes a command, returning its tag.
    pub(crate) async fn send(&mut self, command: &Command) -> Result<String> {
        let tag = self.tag_gen.next();
        tracing::trace!(%tag, command = ?command.redacted(), "sending IMAP command");
        self.stream.write_command(&command.serialize(&tag)).await?;
        Ok(tag)
    }

    /// Reads responses until the tagged completion, counting unsolicited
    /// new-mail notifications on the way.
    pub(crate) async fn read_until_tagged(&mut self, tag: &str) -> Result<Vec<Vec<u8>>> {
        let responses = ResponseAccumulator::new(tag)
            .read_until_tagged(&mut self.stream, self.io_timeout)
            .await?;
        for response in &responses {
            self.note_unsolicited(response);
        }
        Ok(responses)
    }

    /// Counts `response` if it is an EXISTS or RECENT announcement.
    pub(crate) fn note_unsolicited(&mut self, response: &[u8]) {
        if let Ok(Response::Untagged(untagged)) = ResponseParser::parse(response)
            && untagged.is_new_mail_notification()
        {
            self.notifications = self.notifications.saturating_add(1);
        }
    }

    /// Replaces the stored capabilities with any the responses carried,
    /// either as untagged CAPABILITY data or as a `[CAPABILITY ...]` code.
    /// Returns true if any were found.
    pub(crate) fn absorb_capabilities(&mut self, responses: &[Vec<u8>]) -> bool {
        let mut found = false;
        for response in responses {
            match ResponseParser::parse(response) {
                Ok(Response::Untagged(UntaggedResponse::Capability(caps))) => {
                    self.capabilities = caps;
                    found = true;
                }
                Ok(
                    Response::Tagged {
                        code: Some(ResponseCode::Capability(caps)),
                        ..
                    }
                    | Response::Untagged(UntaggedResponse::Ok {
                        code: Some(ResponseCode::Capability(caps)),
                        ..
                    }),
                ) => {
                    self.capabilities = caps;
                    found = true;
                }
                _ => {}
            }
        }
        found
    }

    /// Moves the connection into another state.
    pub(crate) fn transition<T>(self, state: T) -> Client<S, T> {
        Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            io_timeout: self.io_timeout,
            notifications: self.notifications,
            state,
        }
    }

    /// Checks that the tagged response for `tag` is OK.
    pub(crate) fn check_tagged_ok(responses: &[Vec<u8>], tag: &str) -> Result<()> {
        for response in responses.iter().rev() {
            if let Ok(Response::Tagged {
                tag: resp_tag,
                status,
                text,
                ..
            }) = ResponseParser::parse(response)
                && resp_tag.as_str() == tag
            {
                return status_to_result(status, text);
            }
        }

        Err(Error::Protocol("missing tagged response".to_string()))
    }
}

/// Maps a completion status onto the error taxonomy.
pub(crate) fn status_to_result(status: Status, text: String) -> Result<()> {
    match status {
        Status::Ok | Status::PreAuth => Ok(()),
        Status::No => Err(Error::No(text)),
        Status::Bad => Err(Error::Bad(text)),
        Status::Bye => Err(Error::Bye(text)),
    }
}

//! Streaming UID FETCH results.
//!
//! Messages are yielded one at a time as their FETCH responses arrive, so a
//! caller can stop reading bodies it no longer needs.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::{Client, ResponseAccumulator, Selected, status_to_result};
use crate::parser::{FetchItem, Response, ResponseParser, UntaggedResponse};
use crate::types::{Flags, SeqNum, Uid};
use crate::{Error, Result};

/// One message's worth of FETCH data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    /// Sequence number.
    pub seq: SeqNum,
    /// UID (always present for UID FETCH).
    pub uid: Option<Uid>,
    /// Flags, if fetched.
    pub flags: Option<Flags>,
    /// RFC822.SIZE, if fetched.
    pub size: Option<u32>,
    /// Body sections by name; `None` is the whole message.
    pub sections: Vec<(Option<String>, Vec<u8>)>,
}

impl FetchedMessage {
    /// Builds a message from the items of one FETCH response.
    ///
    /// Sections the server returned as NIL are left out.
    #[must_use]
    pub fn from_items(seq: SeqNum, items: Vec<FetchItem>) -> Self {
        let mut message = Self {
            seq,
            uid: None,
            flags: None,
            size: None,
            sections: Vec::new(),
        };
        for item in items {
            match item {
                FetchItem::Uid(uid) => message.uid = Some(uid),
                FetchItem::Flags(flags) => message.flags = Some(flags),
                FetchItem::Rfc822Size(size) => message.size = Some(size),
                FetchItem::Body {
                    section,
                    data: Some(data),
                    ..
                } => message.sections.push((section, data)),
                FetchItem::Body { data: None, .. } => {}
            }
        }
        message
    }

    /// Returns a named section (`HEADER`, `TEXT`, `1.MIME`, ...), compared
    /// case-insensitively.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&[u8]> {
        self.sections.iter().find_map(|(section, data)| {
            section
                .as_deref()
                .filter(|s| s.eq_ignore_ascii_case(name))
                .map(|_| data.as_slice())
        })
    }

    /// Returns the whole-message body (`BODY[]`), if fetched.
    #[must_use]
    pub fn full(&self) -> Option<&[u8]> {
        self.sections
            .iter()
            .find(|(section, _)| section.is_none())
            .map(|(_, data)| data.as_slice())
    }

    /// Returns true if the message carries `\Seen`.
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.flags.as_ref().is_some_and(Flags::is_seen)
    }
}

/// In-progress UID FETCH.
///
/// Dropping the stream early is safe: leftover responses are skipped by the
/// next command, which only stops at its own tag.
pub struct FetchStream<'a, S> {
    client: &'a mut Client<S, Selected>,
    accumulator: ResponseAccumulator,
    done: bool,
}

impl<'a, S> FetchStream<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(client: &'a mut Client<S, Selected>, tag: String) -> Self {
        Self {
            client,
            accumulator: ResponseAccumulator::new(tag),
            done: false,
        }
    }

    /// A stream that yields nothing, for an empty UID set.
    pub(crate) fn finished(client: &'a mut Client<S, Selected>) -> Self {
        Self {
            client,
            accumulator: ResponseAccumulator::new(String::new()),
            done: true,
        }
    }

    /// Returns the next fetched message, or `None` once the command completes.
    ///
    /// FETCH responses without a UID are unsolicited flag updates and are
    /// skipped. A NO or BAD completion is returned as an error.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, timeout, BYE or a failed completion.
    pub async fn next(&mut self) -> Result<Option<FetchedMessage>> {
        if self.done {
            return Ok(None);
        }

        loop {
            let response = match self
                .client
                .stream
                .read_response_within(self.client.io_timeout)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    self.done = true;
                    return Err(self.accumulator.explain(e));
                }
            };
            self.accumulator.observe(&response);

            if self.accumulator.is_completion(&response) {
                self.done = true;
                return match ResponseParser::parse(&response)? {
                    Response::Tagged { status, text, .. } => {
                        status_to_result(status, text).map(|()| None)
                    }
                    _ => Err(Error::Protocol("malformed FETCH completion".to_string())),
                };
            }

            match ResponseParser::parse(&response) {
                Ok(Response::Untagged(UntaggedResponse::Fetch { seq, items })) => {
                    let message = FetchedMessage::from_items(seq, items);
                    if message.uid.is_some() {
                        return Ok(Some(message));
                    }
                }
                Ok(_) => self.client.note_unsolicited(&response),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unparseable response during FETCH");
                }
            }
        }
    }

    /// Drains the stream into a vector.
    ///
    /// # Errors
    ///
    /// Returns the first error [`next`](Self::next) reports.
    pub async fn collect_all(mut self) -> Result<Vec<FetchedMessage>> {
        let mut messages = Vec::new();
        while let Some(message) = self.next().await? {
            messages.push(message);
        }
        Ok(messages)
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
    use super::*;
    use crate::types::Flag;

    #[test]
    fn test_from_items() {
        let mut flags = Flags::new();
        flags.insert(Flag::Seen);
        let message = FetchedMessage::from_items(
            SeqNum::new(3).unwrap(),
            vec![
                FetchItem::Uid(Uid::new(42).unwrap()),
                FetchItem::Flags(flags),
                FetchItem::Body {
                    section: Some("HEADER".to_string()),
                    origin: None,
                    data: Some(b"Subject: hi\r\n\r\n".to_vec()),
                },
                FetchItem::Body {
                    section: Some("TEXT".to_string()),
                    origin: None,
                    data: None,
                },
            ],
        );
        assert_eq!(message.uid, Uid::new(42));
        assert!(message.is_seen());
        assert_eq!(message.section("header"), Some(&b"Subject: hi\r\n\r\n"[..]));
        assert_eq!(message.section("TEXT"), None);
        assert_eq!(message.full(), None);
    }
}

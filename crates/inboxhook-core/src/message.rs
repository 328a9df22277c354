//! Per-message assembly and decoding.
//!
//! FETCH data for one UID may arrive split over several responses. A
//! [`RawMessage`] collects the header and body streams and is only handed
//! on once both have ended.

use std::fmt;

use inboxhook_imap::{FetchedMessage, Uid};
use inboxhook_mime::{Headers, decode_body, extract_links};
use url::Url;

/// Header and body bytes of one message, keyed by UID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    uid: Uid,
    header: Vec<u8>,
    body: Vec<u8>,
    header_done: bool,
    body_done: bool,
    seen: bool,
}

impl RawMessage {
    /// Creates an empty accumulator for `uid`.
    #[must_use]
    pub const fn new(uid: Uid) -> Self {
        Self {
            uid,
            header: Vec::new(),
            body: Vec::new(),
            header_done: false,
            body_done: false,
            seen: false,
        }
    }

    /// The message UID within the current mailbox epoch.
    #[must_use]
    pub const fn uid(&self) -> Uid {
        self.uid
    }

    /// Appends header bytes.
    pub fn push_header(&mut self, chunk: &[u8]) {
        self.header.extend_from_slice(chunk);
    }

    /// Marks the header stream as ended.
    pub const fn end_header(&mut self) {
        self.header_done = true;
    }

    /// Appends body bytes.
    pub fn push_body(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    /// Marks the body stream as ended.
    pub const fn end_body(&mut self) {
        self.body_done = true;
    }

    /// Records that the server already reported `\Seen`.
    pub const fn set_seen(&mut self, seen: bool) {
        self.seen = seen;
    }

    /// True if the server reported `\Seen` when the message was fetched.
    #[must_use]
    pub const fn is_seen(&self) -> bool {
        self.seen
    }

    /// True once both the header and the body stream have ended.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.header_done && self.body_done
    }

    /// Raw header bytes.
    #[must_use]
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Raw body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Routes FETCH sections into per-UID [`RawMessage`]s.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    pending: Vec<RawMessage>,
}

impl MessageAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one FETCH response. Returns the message it completes, if any.
    ///
    /// `HEADER` ends the header stream, `TEXT` ends the body stream, and a
    /// whole-message section ends both. Responses without a UID are ignored.
    pub fn absorb(&mut self, fetched: FetchedMessage) -> Option<RawMessage> {
        let uid = fetched.uid?;
        let index = match self.pending.iter().position(|m| m.uid == uid) {
            Some(index) => index,
            None => {
                self.pending.push(RawMessage::new(uid));
                self.pending.len() - 1
            }
        };

        let message = &mut self.pending[index];
        if let Some(flags) = &fetched.flags {
            message.set_seen(flags.is_seen());
        }
        for (section, data) in &fetched.sections {
            match section.as_deref().map(str::to_ascii_uppercase).as_deref() {
                Some("HEADER") => {
                    message.push_header(data);
                    message.end_header();
                }
                Some("TEXT") => {
                    message.push_body(data);
                    message.end_body();
                }
                None => {
                    let (header, body) = split_message(data);
                    message.push_header(header);
                    message.end_header();
                    message.push_body(body);
                    message.end_body();
                }
                Some(other) => tracing::debug!(%uid, section = other, "ignoring FETCH section"),
            }
        }

        if message.is_complete() {
            Some(self.pending.remove(index))
        } else {
            None
        }
    }

    /// UIDs still waiting for a header or body.
    #[must_use]
    pub fn incomplete(&self) -> Vec<Uid> {
        self.pending.iter().map(RawMessage::uid).collect()
    }
}

/// Splits a full message at the first blank line.
fn split_message(data: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
        return (&data[..pos + 4], &data[pos + 4..]);
    }
    if let Some(pos) = data.windows(2).position(|w| w == b"\n\n") {
        return (&data[..pos + 2], &data[pos + 2..]);
    }
    (data, &[])
}

/// Decoded, read-only view of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEmail {
    /// Decoded `Subject`, empty when absent.
    pub subject: String,
    /// Decoded `From`, empty when absent.
    pub from: String,
    /// Decoded body text.
    pub body: String,
    /// Absolute links in order of first appearance, duplicates included.
    pub links: Vec<String>,
}

impl DecodedEmail {
    /// Decodes headers and body. Never fails; bad encodings degrade to
    /// best-effort text.
    #[must_use]
    pub fn decode(raw: &RawMessage) -> Self {
        let header_text = String::from_utf8_lossy(raw.header());
        let headers = Headers::parse(&header_text);
        let body_text = String::from_utf8_lossy(raw.body());
        let body = decode_body(&body_text, &header_text);
        let links = extract_links(&body);

        Self {
            subject: headers.get_decoded("subject").unwrap_or_default(),
            from: headers.get_decoded("from").unwrap_or_default(),
            body,
            links,
        }
    }
}

/// The link a matched message asks to be acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLink(Url);

impl ActionLink {
    /// Returns the first link containing `marker` that parses as an absolute
    /// URL.
    #[must_use]
    pub fn find(email: &DecodedEmail, marker: &str) -> Option<Self> {
        email
            .links
            .iter()
            .filter(|link| link.contains(marker))
            .find_map(|link| Url::parse(link).ok())
            .map(Self)
    }

    /// The link as a URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.0
    }

    /// The link as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ActionLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
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
    use inboxhook_imap::{Flag, Flags, SeqNum};

    use super::*;

    const MARKER: &str = "update-primary-location";

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    fn fetched(n: u32, sections: Vec<(Option<&str>, &[u8])>) -> FetchedMessage {
        FetchedMessage {
            seq: SeqNum::new(1).unwrap(),
            uid: Some(uid(n)),
            flags: None,
            size: None,
            sections: sections
                .into_iter()
                .map(|(s, d)| (s.map(str::to_string), d.to_vec()))
                .collect(),
        }
    }

    #[test]
    fn test_raw_message_needs_both_streams() {
        let mut raw = RawMessage::new(uid(1));
        raw.push_header(b"Subject: x\r\n\r\n");
        raw.end_header();
        assert!(!raw.is_complete());
        raw.push_body(b"hi");
        assert!(!raw.is_complete());
        raw.end_body();
        assert!(raw.is_complete());
    }

    #[test]
    fn test_assembler_waits_for_split_sections() {
        let mut assembler = MessageAssembler::new();
        assert!(
            assembler
                .absorb(fetched(5, vec![(Some("HEADER"), b"Subject: a\r\n\r\n")]))
                .is_none()
        );
        assert_eq!(assembler.incomplete(), vec![uid(5)]);

        let raw = assembler
            .absorb(fetched(5, vec![(Some("TEXT"), b"body")]))
            .unwrap();
        assert_eq!(raw.uid(), uid(5));
        assert_eq!(raw.header(), b"Subject: a\r\n\r\n");
        assert_eq!(raw.body(), b"body");
        assert!(assembler.incomplete().is_empty());
    }

    #[test]
    fn test_assembler_full_message() {
        let mut assembler = MessageAssembler::new();
        let raw = assembler
            .absorb(fetched(9, vec![(None, b"Subject: a\r\n\r\nhello")]))
            .unwrap();
        assert_eq!(raw.header(), b"Subject: a\r\n\r\n");
        assert_eq!(raw.body(), b"hello");
    }

    #[test]
    fn test_assembler_records_seen_flag() {
        let mut message = fetched(3, vec![(Some("HEADER"), b"\r\n"), (Some("TEXT"), b"")]);
        let mut flags = Flags::new();
        flags.insert(Flag::Seen);
        message.flags = Some(flags);
        let raw = MessageAssembler::new().absorb(message).unwrap();
        assert!(raw.is_seen());
    }

    #[test]
    fn test_assembler_ignores_missing_uid() {
        let mut message = fetched(3, vec![(None, b"x")]);
        message.uid = None;
        assert!(MessageAssembler::new().absorb(message).is_none());
    }

    #[test]
    fn test_decode_quoted_printable_notification() {
        let mut raw = RawMessage::new(uid(1));
        raw.push_header(
            b"From: Netflix <info@account.netflix.com>\r\n\
              Subject: =?UTF-8?Q?Your_Household_Has_Been_Updated?=\r\n\
              Content-Transfer-Encoding: quoted-printable\r\n\r\n",
        );
        raw.end_header();
        raw.push_body(
            b"Confirm here: https://www.netflix.com/account/update-primary-location?nftoken=3D=\r\nabc\r\n",
        );
        raw.end_body();

        let email = DecodedEmail::decode(&raw);
        assert_eq!(email.subject, "Your Household Has Been Updated");
        assert_eq!(email.from, "Netflix <info@account.netflix.com>");
        assert_eq!(
            email.links,
            vec!["https://www.netflix.com/account/update-primary-location?nftoken=abc"]
        );
    }

    #[test]
    fn test_action_link_picks_first_with_marker() {
        let email = DecodedEmail {
            subject: String::new(),
            from: String::new(),
            body: String::new(),
            links: vec![
                "https://www.netflix.com/browse".to_string(),
                "https://www.netflix.com/account/update-primary-location?token=abc".to_string(),
                "https://www.netflix.com/account/update-primary-location?token=def".to_string(),
            ],
        };
        let link = ActionLink::find(&email, MARKER).unwrap();
        assert_eq!(
            link.as_str(),
            "https://www.netflix.com/account/update-primary-location?token=abc"
        );
    }

    #[test]
    fn test_action_link_missing() {
        let email = DecodedEmail {
            subject: String::new(),
            from: String::new(),
            body: String::new(),
            links: vec!["https://www.netflix.com/browse".to_string()],
        };
        assert!(ActionLink::find(&email, MARKER).is_none());
    }
}

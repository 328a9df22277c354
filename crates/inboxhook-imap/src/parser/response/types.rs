//! Response data types.

use crate::types::{Capability, Flags, ResponseCode, SeqNum, Uid};

/// FETCH response item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// Message flags.
    Flags(Flags),
    /// UID.
    Uid(Uid),
    /// RFC822 size.
    Rfc822Size(u32),
    /// `BODY[section]` data.
    Body {
        /// Section specifier, `None` for the whole message.
        section: Option<String>,
        /// Partial fetch origin.
        origin: Option<u32>,
        /// Payload; `None` when the server sent NIL.
        data: Option<Vec<u8>>,
    },
}

/// Untagged response data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// OK status with optional code.
    Ok {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// NO status.
    No {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BAD status.
    Bad {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// PREAUTH greeting.
    PreAuth {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BYE: the server is closing the connection.
    Bye {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// CAPABILITY data.
    Capability(Vec<Capability>),
    /// FLAGS defined in the mailbox.
    Flags(Flags),
    /// SEARCH results. Numbers are UIDs for `UID SEARCH`.
    Search(Vec<u32>),
    /// EXISTS: message count.
    Exists(u32),
    /// RECENT count.
    Recent(u32),
    /// EXPUNGE of a sequence number.
    Expunge(SeqNum),
    /// FETCH data for one message.
    Fetch {
        /// Message sequence number.
        seq: SeqNum,
        /// Fetch data items.
        items: Vec<FetchItem>,
    },
    /// Anything the watcher does not interpret, kept as the raw line.
    Other(String),
}

impl UntaggedResponse {
    /// Returns true for EXISTS and RECENT, which announce new mail.
    #[must_use]
    pub const fn is_new_mail_notification(&self) -> bool {
        matches!(self, Self::Exists(_) | Self::Recent(_))
    }
}

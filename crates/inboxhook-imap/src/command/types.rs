//! Command argument types.

use crate::types::Flag;

/// SEARCH criteria.
///
/// `And` serializes as a space-separated list (IMAP's implicit AND) and `Or`
/// as the prefix `OR a b`, so nested `Or`s chain left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// All messages.
    All,
    /// Messages without `\Seen`.
    Unseen,
    /// Messages with `\Seen`.
    Seen,
    /// FROM contains the string.
    From(String),
    /// SUBJECT contains the string.
    Subject(String),
    /// Named header contains the string.
    Header(String, String),
    /// All criteria must match.
    And(Vec<SearchCriteria>),
    /// Either criterion matches.
    Or(Box<SearchCriteria>, Box<SearchCriteria>),
    /// Criterion must not match.
    Not(Box<SearchCriteria>),
}

impl SearchCriteria {
    /// Combines two criteria with OR.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }
}

/// FETCH data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// UID of the message.
    Uid,
    /// Current flags.
    Flags,
    /// RFC822.SIZE.
    Rfc822Size,
    /// `BODY[section]`, or `BODY.PEEK[section]` when `peek` is set so the
    /// server does not set `\Seen` as a side effect.
    Body {
        /// Section specifier (`HEADER`, `TEXT`, `1.MIME`); `None` for the whole message.
        section: Option<String>,
        /// Use BODY.PEEK.
        peek: bool,
    },
}

impl FetchAttribute {
    /// `BODY.PEEK[HEADER]`.
    #[must_use]
    pub fn peek_header() -> Self {
        Self::Body {
            section: Some("HEADER".to_string()),
            peek: true,
        }
    }

    /// `BODY.PEEK[TEXT]`.
    #[must_use]
    pub fn peek_text() -> Self {
        Self::Body {
            section: Some("TEXT".to_string()),
            peek: true,
        }
    }
}

/// STORE flag operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// `+FLAGS`.
    AddFlags(Vec<Flag>),
    /// `-FLAGS`.
    RemoveFlags(Vec<Flag>),
}

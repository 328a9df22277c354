//! IMAP command builder.
//!
//! Covers the commands a mailbox watcher issues: session setup, mailbox
//! open, search, fetch, flag updates and IDLE.

mod serialize;
mod tag_generator;
mod types;

use crate::types::UidSet;

pub use tag_generator::TagGenerator;
pub use types::{FetchAttribute, SearchCriteria, StoreAction};

use serialize::{write_astring, write_fetch_items, write_search_criteria, write_store_action};

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY command.
    Capability,
    /// NOOP command.
    Noop,
    /// LOGOUT command.
    Logout,
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// SELECT command (read-write).
    Select {
        /// Mailbox to select.
        mailbox: String,
    },
    /// EXAMINE command (read-only SELECT).
    Examine {
        /// Mailbox to examine.
        mailbox: String,
    },
    /// UID SEARCH command.
    UidSearch {
        /// Search criteria.
        criteria: SearchCriteria,
    },
    /// UID FETCH command.
    UidFetch {
        /// Messages to fetch.
        uids: UidSet,
        /// Items to fetch.
        items: Vec<FetchAttribute>,
    },
    /// UID STORE command.
    UidStore {
        /// Messages to update.
        uids: UidSet,
        /// Flag operation.
        action: StoreAction,
        /// Suppress the untagged FETCH echo.
        silent: bool,
    },
    /// IDLE command.
    Idle,
    /// DONE (ends IDLE; carries no tag).
    Done,
}

impl Command {
    /// Serializes the command to bytes with the given tag.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();

        if !matches!(self, Self::Done) {
            buf.extend_from_slice(tag.as_bytes());
            buf.push(b' ');
        }

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Idle => buf.extend_from_slice(b"IDLE"),
            Self::Done => buf.extend_from_slice(b"DONE"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }

            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox);
            }

            Self::Examine { mailbox } => {
                buf.extend_from_slice(b"EXAMINE ");
                write_astring(&mut buf, mailbox);
            }

            Self::UidSearch { criteria } => {
                buf.extend_from_slice(b"UID SEARCH ");
                write_search_criteria(&mut buf, criteria);
            }

            Self::UidFetch { uids, items } => {
                buf.extend_from_slice(b"UID FETCH ");
                buf.extend_from_slice(uids.to_string().as_bytes());
                buf.push(b' ');
                write_fetch_items(&mut buf, items);
            }

            Self::UidStore {
                uids,
                action,
                silent,
            } => {
                buf.extend_from_slice(b"UID STORE ");
                buf.extend_from_slice(uids.to_string().as_bytes());
                buf.push(b' ');
                write_store_action(&mut buf, action, *silent);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns a copy safe to log: LOGIN credentials are masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        match self {
            Self::Login { username, .. } => Self::Login {
                username: username.clone(),
                password: "REDACTED".to_string(),
            },
            other => other.clone(),
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
    use super::*;
    use crate::types::{Flag, Uid};

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    #[test]
    fn test_login_quoting() {
        let cmd = Command::Login {
            username: "user@example.com".to_string(),
            password: "pa ss\"word".to_string(),
        };
        assert_eq!(
            cmd.serialize("W0001"),
            b"W0001 LOGIN user@example.com \"pa ss\\\"word\"\r\n"
        );
    }

    #[test]
    fn test_login_redacted() {
        let cmd = Command::Login {
            username: "u".to_string(),
            password: "secret".to_string(),
        };
        let masked = cmd.redacted().serialize("A");
        assert_eq!(masked, b"A LOGIN u REDACTED\r\n");
        assert!(!String::from_utf8_lossy(&masked).contains("secret"));
    }

    #[test]
    fn test_select_and_examine() {
        let select = Command::Select {
            mailbox: "INBOX".to_string(),
        };
        assert_eq!(select.serialize("W0002"), b"W0002 SELECT INBOX\r\n");
        let examine = Command::Examine {
            mailbox: "Shared Inbox".to_string(),
        };
        assert_eq!(
            examine.serialize("W0003"),
            b"W0003 EXAMINE \"Shared Inbox\"\r\n"
        );
    }

    #[test]
    fn test_uid_search_unseen_from() {
        let cmd = Command::UidSearch {
            criteria: SearchCriteria::And(vec![
                SearchCriteria::Unseen,
                SearchCriteria::From("a@x.com".to_string()),
            ]),
        };
        assert_eq!(cmd.serialize("W1"), b"W1 UID SEARCH UNSEEN FROM a@x.com\r\n");
    }

    #[test]
    fn test_uid_search_chained_or() {
        let senders = SearchCriteria::From("a@x.com".to_string())
            .or(SearchCriteria::From("b@x.com".to_string()))
            .or(SearchCriteria::From("c@x.com".to_string()));
        let cmd = Command::UidSearch {
            criteria: SearchCriteria::And(vec![SearchCriteria::Unseen, senders]),
        };
        assert_eq!(
            cmd.serialize("W1"),
            b"W1 UID SEARCH UNSEEN OR OR FROM a@x.com FROM b@x.com FROM c@x.com\r\n"
        );
    }

    #[test]
    fn test_nested_and_is_parenthesized() {
        let criteria = SearchCriteria::And(vec![SearchCriteria::Unseen, SearchCriteria::Seen])
            .or(SearchCriteria::All);
        let cmd = Command::UidSearch { criteria };
        assert_eq!(cmd.serialize("W1"), b"W1 UID SEARCH OR (UNSEEN SEEN) ALL\r\n");
    }

    #[test]
    fn test_uid_fetch_peek_sections() {
        let cmd = Command::UidFetch {
            uids: UidSet::from_uids(&[uid(4), uid(5), uid(9)]),
            items: vec![
                FetchAttribute::Uid,
                FetchAttribute::peek_header(),
                FetchAttribute::peek_text(),
            ],
        };
        assert_eq!(
            cmd.serialize("W2"),
            b"W2 UID FETCH 4:5,9 (UID BODY.PEEK[HEADER] BODY.PEEK[TEXT])\r\n"
        );
    }

    #[test]
    fn test_uid_store_seen() {
        let add = Command::UidStore {
            uids: UidSet::single(uid(7)),
            action: StoreAction::AddFlags(vec![Flag::Seen]),
            silent: true,
        };
        assert_eq!(add.serialize("W3"), b"W3 UID STORE 7 +FLAGS.SILENT (\\Seen)\r\n");

        let remove = Command::UidStore {
            uids: UidSet::single(uid(7)),
            action: StoreAction::RemoveFlags(vec![Flag::Seen]),
            silent: false,
        };
        assert_eq!(remove.serialize("W4"), b"W4 UID STORE 7 -FLAGS (\\Seen)\r\n");
    }

    #[test]
    fn test_idle_and_done() {
        assert_eq!(Command::Idle.serialize("W5"), b"W5 IDLE\r\n");
        assert_eq!(Command::Done.serialize("ignored"), b"DONE\r\n");
    }
}

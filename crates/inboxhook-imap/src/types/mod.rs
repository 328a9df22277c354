//! Core IMAP types used by the watcher subset of the protocol.

mod capability;
mod flags;
mod identifiers;
mod mailbox;

pub use capability::{Capability, ResponseCode, Status};
pub use flags::{Flag, Flags};
pub use identifiers::{SeqNum, Tag, Uid, UidSet, UidValidity};
pub use mailbox::MailboxStatus;

//! Mailbox status reported by SELECT/EXAMINE.

use super::{Flags, Uid, UidValidity};

/// Snapshot of the selected mailbox taken from the SELECT/EXAMINE response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages (EXISTS).
    pub exists: u32,
    /// Number of recent messages (RECENT).
    pub recent: u32,
    /// First unseen sequence number, if reported.
    pub unseen: Option<u32>,
    /// UID epoch.
    pub uid_validity: Option<UidValidity>,
    /// Next UID to be assigned.
    pub uid_next: Option<Uid>,
    /// Flags defined in the mailbox.
    pub flags: Flags,
    /// True when the server granted read-only access.
    pub read_only: bool,
}

//! Server capabilities, completion status and response codes.

use super::{Flag, Uid, UidValidity};

/// Completion status of a tagged or status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
    /// Server greeting (pre-authenticated).
    PreAuth,
    /// Server is closing connection.
    Bye,
}

/// Server capability relevant to a watcher session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051)
    Imap4Rev2,
    /// IDLE command support (RFC 2177)
    Idle,
    /// STARTTLS support
    StartTls,
    /// LOGIN disabled until TLS is active
    LoginDisabled,
    /// AUTH mechanism
    Auth(String),
    /// Anything else, kept verbatim
    Other(String),
}

impl Capability {
    /// Parses a capability atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "IDLE" => Self::Idle,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            _ => match upper.strip_prefix("AUTH=") {
                Some(mechanism) => Self::Auth(mechanism.to_string()),
                None => Self::Other(s.to_string()),
            },
        }
    }
}

/// Bracketed response code (`[UIDVALIDITY 3]`, `[READ-ONLY]`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: human-readable message the server wants surfaced.
    Alert,
    /// CAPABILITY list sent inline.
    Capability(Vec<Capability>),
    /// PERMANENTFLAGS: flags the client may change permanently.
    PermanentFlags(Vec<Flag>),
    /// READ-ONLY: mailbox opened read-only.
    ReadOnly,
    /// READ-WRITE: mailbox opened read-write.
    ReadWrite,
    /// UIDNEXT: next UID to be assigned.
    UidNext(Uid),
    /// UIDVALIDITY: UID epoch of the mailbox.
    UidValidity(UidValidity),
    /// UNSEEN: sequence number of the first unseen message.
    Unseen(u32),
    /// Unrecognised code, kept by name.
    Other(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_parse() {
        assert_eq!(Capability::parse("IMAP4rev1"), Capability::Imap4Rev1);
        assert_eq!(Capability::parse("idle"), Capability::Idle);
        assert_eq!(
            Capability::parse("AUTH=PLAIN"),
            Capability::Auth("PLAIN".to_string())
        );
        assert_eq!(
            Capability::parse("X-GM-EXT-1"),
            Capability::Other("X-GM-EXT-1".to_string())
        );
    }
}

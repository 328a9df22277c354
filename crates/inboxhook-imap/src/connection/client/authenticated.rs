//! Implementation for the authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, Selected};
use crate::Result;
use crate::command::Command;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{MailboxStatus, ResponseCode};

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Selects a mailbox for read-write access.
    ///
    /// Consumes self and returns a selected client on success.
    pub async fn select(self, mailbox: &str) -> Result<(Client<S, Selected>, MailboxStatus)> {
        self.open(
            Command::Select {
                mailbox: mailbox.to_string(),
            },
            mailbox,
        )
        .await
    }

    /// Examines a mailbox for read-only access.
    ///
    /// Consumes self and returns a selected client on success.
    pub async fn examine(self, mailbox: &str) -> Result<(Client<S, Selected>, MailboxStatus)> {
        self.open(
            Command::Examine {
                mailbox: mailbox.to_string(),
            },
            mailbox,
        )
        .await
    }

    async fn open(
        mut self,
        command: Command,
        mailbox: &str,
    ) -> Result<(Client<S, Selected>, MailboxStatus)> {
        let tag = self.send(&command).await?;
        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;
        let status = parse_mailbox_status(&responses);

        tracing::debug!(
            mailbox,
            exists = status.exists,
            read_only = status.read_only,
            "mailbox opened"
        );

        // EXISTS/RECENT inside the SELECT reply describe the mailbox as
        // opened, not new arrivals.
        self.notifications = 0;
        let state = Selected::new(mailbox, status.clone());
        Ok((self.transition(state), status))
    }
}

/// Collects EXISTS, RECENT, FLAGS and the status codes of a SELECT reply.
pub(super) fn parse_mailbox_status(responses: &[Vec<u8>]) -> MailboxStatus {
    let mut status = MailboxStatus::default();

    for response_bytes in responses {
        let code = match ResponseParser::parse(response_bytes) {
            Ok(Response::Untagged(untagged)) => match untagged {
                UntaggedResponse::Exists(n) => {
                    status.exists = n;
                    continue;
                }
                UntaggedResponse::Recent(n) => {
                    status.recent = n;
                    continue;
                }
                UntaggedResponse::Flags(flags) => {
                    status.flags = flags;
                    continue;
                }
                UntaggedResponse::Ok { code, .. } => code,
                _ => continue,
            },
            Ok(Response::Tagged { code, .. }) => code,
            _ => continue,
        };

        match code {
            Some(ResponseCode::UidValidity(v)) => status.uid_validity = Some(v),
            Some(ResponseCode::UidNext(v)) => status.uid_next = Some(v),
            Some(ResponseCode::Unseen(v)) => status.unseen = Some(v),
            Some(ResponseCode::ReadOnly) => status.read_only = true,
            Some(ResponseCode::ReadWrite) => status.read_only = false,
            _ => {}
        }
    }

    status
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
    use tokio_test::io::Builder;

    use super::*;
    use crate::Error;
    use crate::types::{Flag, Uid, UidValidity};

    fn lines(raw: &[&str]) -> Vec<Vec<u8>> {
        raw.iter().map(|l| l.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_parse_mailbox_status() {
        let responses = lines(&[
            "* FLAGS (\\Answered \\Seen \\Deleted)\r\n",
            "* 17 EXISTS\r\n",
            "* 2 RECENT\r\n",
            "* OK [UNSEEN 12] first unseen\r\n",
            "* OK [UIDVALIDITY 3857529045] UIDs valid\r\n",
            "* OK [UIDNEXT 4392] predicted next UID\r\n",
            "W0002 OK [READ-WRITE] SELECT completed\r\n",
        ]);
        let status = parse_mailbox_status(&responses);
        assert_eq!(status.exists, 17);
        assert_eq!(status.recent, 2);
        assert_eq!(status.unseen, Some(12));
        assert_eq!(status.uid_validity, UidValidity::new(3857529045));
        assert_eq!(status.uid_next, Uid::new(4392));
        assert!(status.flags.contains(&Flag::Seen));
        assert!(!status.read_only);
    }

    #[test]
    fn test_parse_mailbox_status_read_only() {
        let responses = lines(&["* 1 EXISTS\r\n", "W0002 OK [READ-ONLY] EXAMINE completed\r\n"]);
        assert!(parse_mailbox_status(&responses).read_only);
    }

    async fn authenticated(mock: tokio_test::io::Mock) -> Client<tokio_test::io::Mock, Authenticated> {
        Client::from_stream(mock)
            .await
            .unwrap()
            .login("u", "p")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_select_resets_notifications() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n")
            .write(b"W0000 LOGIN u p\r\n")
            .read(b"W0000 OK [CAPABILITY IMAP4rev1 IDLE] ok\r\n")
            .write(b"W0001 SELECT INBOX\r\n")
            .read(b"* 5 EXISTS\r\n")
            .read(b"* 1 RECENT\r\n")
            .read(b"W0001 OK [READ-WRITE] done\r\n")
            .build();
        let client = authenticated(mock).await;
        let (mut selected, status) = client.select("INBOX").await.unwrap();
        assert_eq!(status.exists, 5);
        assert_eq!(selected.state.mailbox(), "INBOX");
        assert_eq!(selected.take_notifications(), 0);
    }

    #[tokio::test]
    async fn test_select_missing_mailbox() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"W0000 LOGIN u p\r\n")
            .read(b"W0000 OK [CAPABILITY IMAP4rev1] ok\r\n")
            .write(b"W0001 SELECT Nope\r\n")
            .read(b"W0001 NO [NONEXISTENT] Unknown Mailbox\r\n")
            .build();
        let client = authenticated(mock).await;
        let err = client.select("Nope").await.unwrap_err();
        assert!(matches!(err, Error::No(_)));
        assert!(!err.is_connection_failure());
    }
}

//! Implementation for the selected state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::Selected;
use crate::Result;
use crate::command::{Command, FetchAttribute, SearchCriteria, StoreAction};
use crate::fetch::FetchStream;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{MailboxStatus, Uid, UidSet};

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the name of the open mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        self.state.mailbox()
    }

    /// Returns the status reported when the mailbox was opened.
    #[must_use]
    pub const fn mailbox_status(&self) -> &MailboxStatus {
        self.state.status()
    }

    /// Returns true if the mailbox was opened read-only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.state.is_read_only()
    }

    /// Runs UID SEARCH and returns the matching UIDs in server order.
    pub async fn uid_search(&mut self, criteria: &SearchCriteria) -> Result<Vec<Uid>> {
        let tag = self
            .send(&Command::UidSearch {
                criteria: criteria.clone(),
            })
            .await?;

        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;

        let mut uids = Vec::new();
        for response_bytes in &responses {
            if let Ok(Response::Untagged(UntaggedResponse::Search(ids))) =
                ResponseParser::parse(response_bytes)
            {
                uids.extend(ids.into_iter().filter_map(Uid::new));
            }
        }
        Ok(uids)
    }

    /// Starts a UID FETCH and returns a stream over the results.
    pub async fn uid_fetch(
        &mut self,
        uids: &UidSet,
        items: Vec<FetchAttribute>,
    ) -> Result<FetchStream<'_, S>> {
        if uids.is_empty() {
            return Ok(FetchStream::finished(self));
        }
        let tag = self
            .send(&Command::UidFetch {
                uids: uids.clone(),
                items,
            })
            .await?;
        Ok(FetchStream::new(self, tag))
    }

    /// Applies a flag change with `UID STORE ... .SILENT`.
    pub async fn uid_store(&mut self, uids: &UidSet, action: StoreAction) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }
        let tag = self
            .send(&Command::UidStore {
                uids: uids.clone(),
                action,
                silent: true,
            })
            .await?;

        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)
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
    use tokio_test::io::{Builder, Mock};

    use super::*;
    use crate::Error;
    use crate::types::Flag;

    async fn selected(mock: Mock) -> Client<Mock, Selected> {
        let client = Client::from_stream(mock).await.unwrap();
        client.transition(Selected::new("INBOX", MailboxStatus::default()))
    }

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_uid_search_counts_unsolicited_exists() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"W0000 UID SEARCH UNSEEN\r\n")
            .read(b"* 9 EXISTS\r\n")
            .read(b"* SEARCH 101 105\r\n")
            .read(b"W0000 OK SEARCH completed\r\n")
            .build();
        let mut client = selected(mock).await;
        let uids = client.uid_search(&SearchCriteria::Unseen).await.unwrap();
        assert_eq!(uids, vec![uid(101), uid(105)]);
        assert_eq!(client.take_notifications(), 1);
        assert_eq!(client.take_notifications(), 0);
    }

    #[tokio::test]
    async fn test_uid_search_empty() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"W0000 UID SEARCH UNSEEN\r\n")
            .read(b"* SEARCH\r\n")
            .read(b"W0000 OK SEARCH completed\r\n")
            .build();
        let mut client = selected(mock).await;
        assert!(client.uid_search(&SearchCriteria::Unseen).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uid_fetch_streams_messages() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"W0000 UID FETCH 7 (UID BODY.PEEK[HEADER] BODY.PEEK[TEXT])\r\n")
            .read(b"* 2 FETCH (FLAGS (\\Seen))\r\n")
            .read(b"* 1 FETCH (UID 7 BODY[HEADER] {13}\r\n")
            .read(b"Subject: hi\r\n BODY[TEXT] {5}\r\n")
            .read(b"hello)\r\n")
            .read(b"W0000 OK FETCH completed\r\n")
            .build();
        let mut client = selected(mock).await;
        let mut stream = client
            .uid_fetch(
                &UidSet::single(uid(7)),
                vec![
                    FetchAttribute::Uid,
                    FetchAttribute::peek_header(),
                    FetchAttribute::peek_text(),
                ],
            )
            .await
            .unwrap();

        let message = stream.next().await.unwrap().unwrap();
        assert_eq!(message.uid, Some(uid(7)));
        assert_eq!(message.section("HEADER"), Some(&b"Subject: hi\r\n"[..]));
        assert_eq!(message.section("TEXT"), Some(&b"hello"[..]));
        assert!(stream.next().await.unwrap().is_none());
        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uid_fetch_failure() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"W0000 UID FETCH 7 (UID)\r\n")
            .read(b"W0000 NO message gone\r\n")
            .build();
        let mut client = selected(mock).await;
        let stream = client
            .uid_fetch(&UidSet::single(uid(7)), vec![FetchAttribute::Uid])
            .await
            .unwrap();
        let err = stream.collect_all().await.unwrap_err();
        assert!(matches!(err, Error::No(ref text) if text == "message gone"));
    }

    #[tokio::test]
    async fn test_uid_fetch_empty_set_sends_nothing() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut client = selected(mock).await;
        let stream = client.uid_fetch(&UidSet::from_uids(&[]), vec![]).await.unwrap();
        assert!(stream.collect_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uid_store_seen() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"W0000 UID STORE 7 +FLAGS.SILENT (\\Seen)\r\n")
            .read(b"W0000 OK STORE completed\r\n")
            .build();
        let mut client = selected(mock).await;
        client
            .uid_store(&UidSet::single(uid(7)), StoreAction::AddFlags(vec![Flag::Seen]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_uid_store_read_only_rejected() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"W0000 UID STORE 7 -FLAGS.SILENT (\\Seen)\r\n")
            .read(b"W0000 NO [READ-ONLY] mailbox is read-only\r\n")
            .build();
        let mut client = selected(mock).await;
        let err = client
            .uid_store(
                &UidSet::single(uid(7)),
                StoreAction::RemoveFlags(vec![Flag::Seen]),
            )
            .await
            .unwrap_err();
        assert!(!err.is_connection_failure());
    }
}

//! Integration tests for the IMAP client.
//!
//! A scripted mock stream plays the server side of a full watcher session.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use tokio_test::io::Builder;

use inboxhook_imap::{
    Client, Error, FetchAttribute, Flag, IdleEvent, SearchCriteria, StoreAction, Uid, UidSet,
};

#[tokio::test]
async fn test_watcher_session() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 IDLE AUTH=PLAIN] Dovecot ready.\r\n")
        .write(b"W0000 LOGIN watcher@example.com \"app pass\"\r\n")
        .read(b"W0000 OK [CAPABILITY IMAP4rev1 IDLE] Logged in\r\n")
        .write(b"W0001 SELECT INBOX\r\n")
        .read(b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n")
        .read(b"* 3 EXISTS\r\n")
        .read(b"* 0 RECENT\r\n")
        .read(b"* OK [UIDVALIDITY 1700000000] UIDs valid\r\n")
        .read(b"* OK [UIDNEXT 58] Predicted next UID\r\n")
        .read(b"W0001 OK [READ-WRITE] Select completed\r\n")
        .write(b"W0002 UID SEARCH UNSEEN FROM info@account.example\r\n")
        .read(b"* SEARCH 57\r\n")
        .read(b"W0002 OK Search completed\r\n")
        .write(b"W0003 UID FETCH 57 (UID BODY.PEEK[HEADER] BODY.PEEK[TEXT])\r\n")
        .read(b"* 3 FETCH (UID 57 BODY[HEADER] {33}\r\n")
        .read(b"Subject: Confirm your sign-in\r\n\r\n")
        .read(b" BODY[TEXT] {11}\r\n")
        .read(b"click here\n")
        .read(b")\r\n")
        .read(b"W0003 OK Fetch completed\r\n")
        .write(b"W0004 UID STORE 57 +FLAGS.SILENT (\\Seen)\r\n")
        .read(b"W0004 OK Store completed\r\n")
        .write(b"W0005 IDLE\r\n")
        .read(b"+ idling\r\n")
        .read(b"* 4 EXISTS\r\n")
        .write(b"DONE\r\n")
        .read(b"W0005 OK Idle completed\r\n")
        .write(b"W0006 LOGOUT\r\n")
        .read(b"* BYE Logging out\r\n")
        .read(b"W0006 OK Logout completed\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    assert!(client.supports_idle());

    let client = client.login("watcher@example.com", "app pass").await.unwrap();
    let (mut client, status) = client.select("INBOX").await.unwrap();
    assert_eq!(status.exists, 3);
    assert_eq!(status.uid_next, Uid::new(58));
    assert!(!client.is_read_only());

    let criteria = SearchCriteria::And(vec![
        SearchCriteria::Unseen,
        SearchCriteria::From("info@account.example".to_string()),
    ]);
    let uids = client.uid_search(&criteria).await.unwrap();
    assert_eq!(uids, vec![Uid::new(57).unwrap()]);

    let messages = client
        .uid_fetch(
            &UidSet::from_uids(&uids),
            vec![
                FetchAttribute::Uid,
                FetchAttribute::peek_header(),
                FetchAttribute::peek_text(),
            ],
        )
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].section("HEADER"),
        Some(&b"Subject: Confirm your sign-in\r\n\r\n"[..])
    );
    assert_eq!(messages[0].section("TEXT"), Some(&b"click here\n"[..]));

    client
        .uid_store(
            &UidSet::from_uids(&uids),
            StoreAction::AddFlags(vec![Flag::Seen]),
        )
        .await
        .unwrap();

    let mut handle = client.idle().await.unwrap();
    let event = handle.wait(Duration::from_secs(5)).await.unwrap();
    assert!(event.is_new_mail());
    handle.done().await.unwrap();

    client.logout().await.unwrap();
}

#[tokio::test]
async fn test_server_drop_mid_command_is_connection_failure() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"W0000 LOGIN u p\r\n")
        .read(b"W0000 OK [CAPABILITY IMAP4rev1] ok\r\n")
        .write(b"W0001 SELECT INBOX\r\n")
        .read(b"* 1 EXISTS\r\n")
        .read(b"W0001 OK done\r\n")
        .write(b"W0002 NOOP\r\n")
        .read(b"* BYE Server shutting down\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let client = client.login("u", "p").await.unwrap();
    let (mut client, _) = client.select("INBOX").await.unwrap();
    let err = client.noop().await.unwrap_err();
    assert!(matches!(err, Error::Bye(_)));
    assert!(err.is_connection_failure());
}

//! Mailbox session seams.
//!
//! The watcher talks to the mailbox through [`MailStore`] and
//! [`MailSession`]; the supervisor obtains sessions from a [`Connector`].
//! [`ImapConnector`] and [`ImapSession`] are the production implementations
//! on top of `inboxhook-imap`.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use inboxhook_imap::{
    Client, FetchAttribute, FetchedMessage, Flag, IdleEvent, ImapStream, SearchCriteria, Selected,
    StoreAction, Uid, UidSet,
};
use tokio::time::Instant;

/// Result of waiting for mailbox activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// The server announced new mail.
    NewMail,
    /// The wait ended without news.
    Quiet,
}

/// Commands a check cycle issues against the open mailbox.
pub trait MailStore {
    /// Runs a UID search.
    async fn search(&mut self, criteria: &SearchCriteria) -> inboxhook_imap::Result<Vec<Uid>>;

    /// Fetches UID, flags, header and body of each message without setting
    /// `\Seen`, in server delivery order.
    async fn fetch(&mut self, uids: &UidSet) -> inboxhook_imap::Result<Vec<FetchedMessage>>;

    /// Adds `\Seen`.
    async fn mark_seen(&mut self, uid: Uid) -> inboxhook_imap::Result<()>;

    /// Removes `\Seen`.
    async fn mark_unseen(&mut self, uid: Uid) -> inboxhook_imap::Result<()>;

    /// Returns and resets the count of new-mail announcements that arrived
    /// while other commands ran.
    fn take_notifications(&mut self) -> u32;
}

/// A live session: a [`MailStore`] that can also wait for push events.
pub trait MailSession: MailStore {
    /// Waits up to `max` for the server to announce new mail.
    async fn wait_for_activity(&mut self, max: Duration) -> inboxhook_imap::Result<Activity>;

    /// Ends the session politely.
    async fn logout(self) -> inboxhook_imap::Result<()>;
}

/// Opens sessions with the mailbox already selected.
pub trait Connector {
    /// The session type produced.
    type Session: MailSession;

    /// Connects, authenticates and opens the mailbox.
    async fn connect(&self) -> inboxhook_imap::Result<Self::Session>;
}

/// Connection parameters for [`ImapConnector`].
#[derive(Clone)]
pub struct ImapConnector {
    config: inboxhook_imap::Config,
    username: String,
    password: String,
    mailbox: String,
    read_only: bool,
    idle_interval: Duration,
    keepalive_interval: Duration,
}

impl std::fmt::Debug for ImapConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnector")
            .field("config", &self.config)
            .field("username", &self.username)
            .field("mailbox", &self.mailbox)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl ImapConnector {
    /// Creates a connector that selects `mailbox` read-write.
    #[must_use]
    pub fn new(
        config: inboxhook_imap::Config,
        username: impl Into<String>,
        password: impl Into<String>,
        mailbox: impl Into<String>,
    ) -> Self {
        Self {
            config,
            username: username.into(),
            password: password.into(),
            mailbox: mailbox.into(),
            read_only: false,
            idle_interval: Duration::from_secs(600),
            keepalive_interval: Duration::from_secs(60),
        }
    }

    /// Opens the mailbox with EXAMINE instead of SELECT.
    ///
    /// A read-only session cannot set `\Seen`.
    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Sets how long a single IDLE may last before it is re-issued.
    #[must_use]
    pub const fn idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Sets the NOOP interval for servers without IDLE.
    #[must_use]
    pub const fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }
}

impl Connector for ImapConnector {
    type Session = ImapSession;

    async fn connect(&self) -> inboxhook_imap::Result<ImapSession> {
        let client = Client::connect(&self.config).await?;
        let client = client.login(&self.username, &self.password).await?;
        let (client, status) = if self.read_only {
            client.examine(&self.mailbox).await?
        } else {
            client.select(&self.mailbox).await?
        };

        tracing::info!(
            mailbox = %self.mailbox,
            exists = status.exists,
            idle = client.supports_idle(),
            read_only = status.read_only,
            "mailbox opened"
        );

        Ok(ImapSession {
            client,
            idle_interval: self.idle_interval,
            keepalive_interval: self.keepalive_interval,
        })
    }
}

/// An open IMAP session with the target mailbox selected.
#[derive(Debug)]
pub struct ImapSession {
    client: Client<ImapStream, Selected>,
    idle_interval: Duration,
    keepalive_interval: Duration,
}

impl MailStore for ImapSession {
    async fn search(&mut self, criteria: &SearchCriteria) -> inboxhook_imap::Result<Vec<Uid>> {
        self.client.uid_search(criteria).await
    }

    async fn fetch(&mut self, uids: &UidSet) -> inboxhook_imap::Result<Vec<FetchedMessage>> {
        let items = vec![
            FetchAttribute::Uid,
            FetchAttribute::Flags,
            FetchAttribute::peek_header(),
            FetchAttribute::peek_text(),
        ];
        self.client.uid_fetch(uids, items).await?.collect_all().await
    }

    async fn mark_seen(&mut self, uid: Uid) -> inboxhook_imap::Result<()> {
        self.client
            .uid_store(&UidSet::single(uid), StoreAction::AddFlags(vec![Flag::Seen]))
            .await
    }

    async fn mark_unseen(&mut self, uid: Uid) -> inboxhook_imap::Result<()> {
        self.client
            .uid_store(
                &UidSet::single(uid),
                StoreAction::RemoveFlags(vec![Flag::Seen]),
            )
            .await
    }

    fn take_notifications(&mut self) -> u32 {
        self.client.take_notifications()
    }
}

impl MailSession for ImapSession {
    async fn wait_for_activity(&mut self, max: Duration) -> inboxhook_imap::Result<Activity> {
        if self.client.take_notifications() > 0 {
            return Ok(Activity::NewMail);
        }

        if !self.client.supports_idle() {
            tokio::time::sleep(max.min(self.keepalive_interval)).await;
            self.client.noop().await?;
            return Ok(if self.client.take_notifications() > 0 {
                Activity::NewMail
            } else {
                Activity::Quiet
            });
        }

        let deadline = Instant::now() + max.min(self.idle_interval);
        let mut activity = Activity::Quiet;
        let mut handle = self.client.idle().await?;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let event = handle.wait(remaining).await?;
            tracing::trace!(?event, "IDLE event");
            if event.is_new_mail() {
                activity = Activity::NewMail;
                break;
            }
            if event == IdleEvent::Timeout {
                break;
            }
        }
        handle.done().await?;

        if self.client.take_notifications() > 0 {
            activity = Activity::NewMail;
        }
        Ok(activity)
    }

    async fn logout(self) -> inboxhook_imap::Result<()> {
        self.client.logout().await
    }
}

//! Check cycles and the supervisor loop against an in-memory mailbox.

#![allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::similar_names
)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use inboxhook_core::{
    Activity, Connector, DispatchError, MailSession, MailStore, PageAutomation, ReconnectPolicy,
    RunOutcome, SeenPolicy, Supervisor, TargetFilter, WatchTiming, Watcher,
};
use inboxhook_imap::{FetchedMessage, Flag, Flags, SearchCriteria, SeqNum, Uid, UidSet};

const LINK: &str = "https://www.netflix.com/account/update-primary-location?token=abc";
const MARKER: &str = "update-primary-location";

#[derive(Debug, Clone)]
struct FakeMessage {
    uid: u32,
    from: String,
    subject: String,
    body: String,
    seen: bool,
}

fn netflix(uid: u32) -> FakeMessage {
    FakeMessage {
        uid,
        from: "Netflix <info@netflix.com>".to_string(),
        subject: "Your Household Has Been Updated".to_string(),
        body: "Was this you? Confirm here:\r\n\
               https://www.netflix.com/account/update-primary-location?token=3Dabc\r\n\
               Or visit https://help.netflix.com/ for help.\r\n"
            .to_string(),
        seen: false,
    }
}

/// What the next `wait_for_activity` call does.
#[derive(Debug)]
enum WaitStep {
    /// Deliver a message and announce it immediately.
    Announce(FakeMessage),
    /// Deliver a message silently; only a poll will find it.
    Deliver(FakeMessage),
    /// Fail as if the connection dropped.
    Drop,
}

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<FakeMessage>,
    searches: u32,
    notifications: u32,
    announce_on_search: VecDeque<u32>,
    fail_store: bool,
    fail_search: bool,
    unseen_calls: Vec<u32>,
    wait_steps: VecDeque<WaitStep>,
    logged_out: bool,
}

/// Shared-state fake so tests can inspect it after the session was moved.
#[derive(Debug, Clone, Default)]
struct FakeMailbox {
    inner: Arc<Mutex<Inner>>,
}

impl FakeMailbox {
    fn with(messages: Vec<FakeMessage>) -> Self {
        let mailbox = Self::default();
        mailbox.inner.lock().unwrap().messages = messages;
        mailbox
    }

    fn state(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn is_seen(&self, uid: u32) -> bool {
        self.state()
            .messages
            .iter()
            .any(|m| m.uid == uid && m.seen)
    }
}

fn uid(n: u32) -> Uid {
    Uid::new(n).unwrap()
}

fn set_seen(inner: &mut Inner, target: Uid, seen: bool) -> inboxhook_imap::Result<()> {
    if inner.fail_store {
        return Err(inboxhook_imap::Error::No("STORE failed".to_string()));
    }
    for message in &mut inner.messages {
        if message.uid == target.get() {
            message.seen = seen;
        }
    }
    Ok(())
}

impl MailStore for FakeMailbox {
    async fn search(&mut self, _criteria: &SearchCriteria) -> inboxhook_imap::Result<Vec<Uid>> {
        let mut inner = self.state();
        if inner.fail_search {
            return Err(inboxhook_imap::Error::Bye("server shutting down".to_string()));
        }
        inner.searches += 1;
        if let Some(n) = inner.announce_on_search.pop_front() {
            inner.notifications += n;
        }
        // Bare UNSEEN: sender filtering is left to the client side.
        Ok(inner
            .messages
            .iter()
            .filter(|m| !m.seen)
            .map(|m| uid(m.uid))
            .collect())
    }

    async fn fetch(&mut self, uids: &UidSet) -> inboxhook_imap::Result<Vec<FetchedMessage>> {
        let inner = self.state();
        let mut out = Vec::new();
        for (index, message) in inner.messages.iter().enumerate() {
            if !uids.contains(uid(message.uid)) {
                continue;
            }
            let seq = SeqNum::new(u32::try_from(index).unwrap() + 1).unwrap();
            let mut flags = Flags::new();
            if message.seen {
                flags.insert(Flag::Seen);
            }
            let header = format!(
                "From: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\
                 Content-Transfer-Encoding: quoted-printable\r\n\r\n",
                message.from, message.subject
            );
            // Header and body arrive in separate FETCH responses.
            out.push(FetchedMessage {
                seq,
                uid: Some(uid(message.uid)),
                flags: Some(flags),
                size: None,
                sections: vec![(Some("HEADER".to_string()), header.into_bytes())],
            });
            out.push(FetchedMessage {
                seq,
                uid: Some(uid(message.uid)),
                flags: None,
                size: None,
                sections: vec![(Some("TEXT".to_string()), message.body.clone().into_bytes())],
            });
        }
        Ok(out)
    }

    async fn mark_seen(&mut self, target: Uid) -> inboxhook_imap::Result<()> {
        set_seen(&mut self.state(), target, true)
    }

    async fn mark_unseen(&mut self, target: Uid) -> inboxhook_imap::Result<()> {
        let mut inner = self.state();
        inner.unseen_calls.push(target.get());
        set_seen(&mut inner, target, false)
    }

    fn take_notifications(&mut self) -> u32 {
        std::mem::take(&mut self.state().notifications)
    }
}

impl MailSession for FakeMailbox {
    async fn wait_for_activity(&mut self, max: Duration) -> inboxhook_imap::Result<Activity> {
        let step = self.state().wait_steps.pop_front();
        match step {
            Some(WaitStep::Announce(message)) => {
                self.state().messages.push(message);
                Ok(Activity::NewMail)
            }
            Some(WaitStep::Deliver(message)) => {
                self.state().messages.push(message);
                tokio::time::sleep(max).await;
                Ok(Activity::Quiet)
            }
            Some(WaitStep::Drop) => Err(inboxhook_imap::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))),
            None => {
                tokio::time::sleep(max).await;
                Ok(Activity::Quiet)
            }
        }
    }

    async fn logout(self) -> inboxhook_imap::Result<()> {
        self.state().logged_out = true;
        Ok(())
    }
}

/// Hands out scripted sessions; `None` or an exhausted script refuses.
#[derive(Debug, Default)]
struct FakeConnector {
    script: Mutex<VecDeque<Option<FakeMailbox>>>,
    connects: Mutex<u32>,
}

impl FakeConnector {
    fn new(script: Vec<Option<FakeMailbox>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            connects: Mutex::new(0),
        }
    }

    fn connects(&self) -> u32 {
        *self.connects.lock().unwrap()
    }
}

impl Connector for FakeConnector {
    type Session = FakeMailbox;

    async fn connect(&self) -> inboxhook_imap::Result<FakeMailbox> {
        *self.connects.lock().unwrap() += 1;
        self.script.lock().unwrap().pop_front().flatten().ok_or_else(|| {
            inboxhook_imap::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))
        })
    }
}

#[derive(Debug, Default)]
struct Recorder {
    fail: bool,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    finished: Mutex<u32>,
}

impl Recorder {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn finished(&self) -> u32 {
        *self.finished.lock().unwrap()
    }
}

impl PageAutomation for Recorder {
    async fn automate(&self, url: &str) -> Result<(), DispatchError> {
        self.calls.lock().unwrap().push(url.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        *self.finished.lock().unwrap() += 1;
        if self.fail {
            Err(DispatchError::Timeout(Duration::from_secs(30)))
        } else {
            Ok(())
        }
    }
}

fn watcher(automation: Recorder) -> Watcher<Recorder> {
    let filter = TargetFilter::new(["household"], ["info@netflix.com"]);
    Watcher::new(filter, MARKER, automation)
}

fn calls(watcher: &Watcher<Recorder>) -> Vec<String> {
    watcher.dispatcher().automation().calls.lock().unwrap().clone()
}

#[tokio::test]
async fn test_netflix_notification_end_to_end() {
    let mut mailbox = FakeMailbox::with(vec![netflix(1)]);
    let mut watcher = watcher(Recorder::default());

    let report = watcher.run_check_cycle(&mut mailbox).await.unwrap();

    assert_eq!(report.candidates, 1);
    assert_eq!(report.matched, 1);
    assert_eq!(report.dispatched, 1);
    assert!(mailbox.is_seen(1));
    assert_eq!(calls(&watcher), vec![LINK]);
    assert!(!watcher.gate().in_flight());
}

#[tokio::test]
async fn test_sender_match_with_other_subject_is_left_unseen() {
    let mut message = netflix(1);
    message.subject = "New sign-in to your account".to_string();
    let mut mailbox = FakeMailbox::with(vec![message]);
    let mut watcher = watcher(Recorder::default());

    let report = watcher.run_check_cycle(&mut mailbox).await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.matched, 0);
    assert!(!mailbox.is_seen(1));
    assert!(calls(&watcher).is_empty());
}

#[tokio::test]
async fn test_other_sender_is_left_unseen() {
    let mut message = netflix(1);
    message.from = "Streaming Deals <promo@example.com>".to_string();
    let mut mailbox = FakeMailbox::with(vec![message]);
    let mut watcher = watcher(Recorder::default());

    let report = watcher.run_check_cycle(&mut mailbox).await.unwrap();

    assert_eq!(report.skipped, 1);
    assert!(!mailbox.is_seen(1));
}

#[tokio::test]
async fn test_match_is_dispatched_once_across_cycles() {
    let mut mailbox = FakeMailbox::with(vec![netflix(1)]);
    let mut watcher = watcher(Recorder::default());

    watcher.run_check_cycle(&mut mailbox).await.unwrap();
    let second = watcher.run_check_cycle(&mut mailbox).await.unwrap();

    assert_eq!(second.candidates, 0);
    assert_eq!(calls(&watcher).len(), 1);
}

#[tokio::test]
async fn test_messages_processed_in_delivery_order() {
    let mut second = netflix(2);
    second.body = second.body.replace("3Dabc", "3Ddef");
    let mut mailbox = FakeMailbox::with(vec![netflix(1), second]);
    let mut watcher = watcher(Recorder::default());

    let report = watcher.run_check_cycle(&mut mailbox).await.unwrap();

    assert_eq!(report.dispatched, 2);
    assert_eq!(
        calls(&watcher),
        vec![
            LINK.to_string(),
            LINK.replace("token=abc", "token=def"),
        ]
    );
}

#[tokio::test]
async fn test_announcements_during_cycle_coalesce_into_one_recheck() {
    let mut mailbox = FakeMailbox::with(vec![netflix(1)]);
    mailbox.state().announce_on_search = VecDeque::from([3]);
    let mut watcher = watcher(Recorder::default());

    let report = watcher.run_check_cycle(&mut mailbox).await.unwrap();

    assert_eq!(report.cycles, 2);
    assert_eq!(mailbox.state().searches, 2);
    assert_eq!(calls(&watcher).len(), 1);
    assert!(!watcher.gate().in_flight());
}

#[tokio::test]
async fn test_failed_seen_store_skips_dispatch() {
    let mut mailbox = FakeMailbox::with(vec![netflix(1)]);
    mailbox.state().fail_store = true;
    let mut watcher = watcher(Recorder::default());

    let report = watcher.run_check_cycle(&mut mailbox).await.unwrap();

    assert_eq!(report.matched, 0);
    assert!(!mailbox.is_seen(1));
    assert!(calls(&watcher).is_empty());
    assert!(!watcher.gate().in_flight());
}

#[tokio::test]
async fn test_missing_action_link_is_reported_not_retried() {
    let mut message = netflix(1);
    message.body = "Visit https://help.netflix.com/ if this was not you.".to_string();
    let mut mailbox = FakeMailbox::with(vec![message]);
    let mut watcher = watcher(Recorder::default());

    let report = watcher.run_check_cycle(&mut mailbox).await.unwrap();

    assert_eq!(report.missing_link, 1);
    assert!(mailbox.is_seen(1));
    assert!(calls(&watcher).is_empty());
}

#[tokio::test]
async fn test_automation_failure_keeps_message_seen() {
    let mut mailbox = FakeMailbox::with(vec![netflix(1)]);
    let mut watcher = watcher(Recorder::failing());

    let report = watcher.run_check_cycle(&mut mailbox).await.unwrap();

    assert_eq!(report.failed, 1);
    assert!(mailbox.is_seen(1));
    assert!(mailbox.state().unseen_calls.is_empty());
}

#[tokio::test]
async fn test_revert_policy_marks_unseen_after_failure() {
    let mut mailbox = FakeMailbox::with(vec![netflix(1)]);
    let mut watcher = watcher(Recorder::failing()).with_seen_policy(SeenPolicy::RevertToUnseen);

    let report = watcher.run_check_cycle(&mut mailbox).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(mailbox.state().unseen_calls, vec![1]);
    assert!(!mailbox.is_seen(1));
}

#[tokio::test]
async fn test_connection_failure_propagates_and_clears_gate() {
    let mut mailbox = FakeMailbox::with(vec![netflix(1)]);
    mailbox.state().fail_search = true;
    let mut watcher = watcher(Recorder::default());

    let err = watcher.run_check_cycle(&mut mailbox).await.unwrap_err();

    assert!(err.is_connection_failure());
    assert!(!watcher.gate().in_flight());
    assert!(!watcher.gate().recheck_requested());
}

#[tokio::test(start_paused = true)]
async fn test_push_announcement_triggers_cycle_before_poll() {
    let mailbox = FakeMailbox::default();
    mailbox
        .state()
        .wait_steps
        .push_back(WaitStep::Announce(netflix(7)));
    let connector = FakeConnector::new(vec![Some(mailbox.clone())]);
    let mut watcher = watcher(Recorder::default());
    let mut supervisor = Supervisor::new(ReconnectPolicy::default());

    let outcome = supervisor
        .run(
            &connector,
            &mut watcher,
            WatchTiming {
                poll_interval: Duration::from_secs(60),
            },
            tokio::time::sleep(Duration::from_secs(1)),
        )
        .await;

    assert_eq!(outcome, RunOutcome::Shutdown);
    assert_eq!(calls(&watcher), vec![LINK]);
    assert!(mailbox.state().logged_out);
}

#[tokio::test(start_paused = true)]
async fn test_poll_finds_silently_delivered_mail() {
    let mailbox = FakeMailbox::default();
    mailbox
        .state()
        .wait_steps
        .push_back(WaitStep::Deliver(netflix(3)));
    let connector = FakeConnector::new(vec![Some(mailbox.clone())]);
    let mut watcher = watcher(Recorder::default());
    let mut supervisor = Supervisor::new(ReconnectPolicy::default());

    let outcome = supervisor
        .run(
            &connector,
            &mut watcher,
            WatchTiming::default(),
            tokio::time::sleep(Duration::from_secs(12)),
        )
        .await;

    assert_eq!(outcome, RunOutcome::Shutdown);
    assert!(mailbox.is_seen(3));
    assert_eq!(calls(&watcher).len(), 1);
    assert!(mailbox.state().searches >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_refused_connections_back_off_then_give_up() {
    let connector = FakeConnector::new(Vec::new());
    let mut watcher = watcher(Recorder::default());
    let mut supervisor = Supervisor::new(ReconnectPolicy {
        max_attempts: 3,
        ..ReconnectPolicy::default()
    });
    let started = tokio::time::Instant::now();

    let outcome = supervisor
        .run(
            &connector,
            &mut watcher,
            WatchTiming::default(),
            std::future::pending::<()>(),
        )
        .await;

    assert_eq!(outcome, RunOutcome::Exhausted { attempts: 3 });
    assert_eq!(connector.connects(), 4);
    // 5s + 10s + 20s of backoff.
    assert_eq!(started.elapsed().as_secs(), 35);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_session_is_replaced_and_counter_resets() {
    let first = FakeMailbox::with(vec![netflix(1)]);
    first.state().wait_steps.push_back(WaitStep::Drop);
    let second = FakeMailbox::default();
    second.state().wait_steps.push_back(WaitStep::Drop);
    let connector = FakeConnector::new(vec![Some(first.clone()), Some(second.clone())]);
    let mut watcher = watcher(Recorder::default());
    let mut supervisor = Supervisor::new(ReconnectPolicy {
        max_attempts: 1,
        ..ReconnectPolicy::default()
    });

    let outcome = supervisor
        .run(
            &connector,
            &mut watcher,
            WatchTiming::default(),
            std::future::pending::<()>(),
        )
        .await;

    // first drops, retry 1 succeeds and resets the counter, second drops,
    // retry 1 again is refused and the ceiling is reached.
    assert_eq!(outcome, RunOutcome::Exhausted { attempts: 1 });
    assert_eq!(connector.connects(), 3);
    assert_eq!(calls(&watcher), vec![LINK]);
    assert_eq!(second.state().searches, 1);
    assert!(!first.state().logged_out);
    assert!(!watcher.gate().in_flight());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_running_dispatch() {
    let mailbox = FakeMailbox::with(vec![netflix(1)]);
    let connector = FakeConnector::new(vec![Some(mailbox.clone())]);
    let mut watcher = watcher(Recorder::slow(Duration::from_secs(10)));
    let mut supervisor = Supervisor::new(ReconnectPolicy::default());
    let started = tokio::time::Instant::now();

    // Fires while the first cycle is still inside the automation call.
    let outcome = supervisor
        .run(
            &connector,
            &mut watcher,
            WatchTiming::default(),
            tokio::time::sleep(Duration::from_secs(1)),
        )
        .await;

    assert_eq!(outcome, RunOutcome::Shutdown);
    assert!(mailbox.is_seen(1));
    assert_eq!(calls(&watcher), vec![LINK]);
    assert_eq!(watcher.dispatcher().automation().finished(), 1);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(mailbox.state().logged_out);
    assert_eq!(mailbox.state().searches, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_idle_wait() {
    let mailbox = FakeMailbox::default();
    let connector = FakeConnector::new(vec![Some(mailbox.clone())]);
    let mut watcher = watcher(Recorder::default());
    let mut supervisor = Supervisor::new(ReconnectPolicy::default());
    let started = tokio::time::Instant::now();

    let outcome = supervisor
        .run(
            &connector,
            &mut watcher,
            WatchTiming {
                poll_interval: Duration::from_secs(600),
            },
            tokio::time::sleep(Duration::from_secs(2)),
        )
        .await;

    assert_eq!(outcome, RunOutcome::Shutdown);
    assert_eq!(started.elapsed().as_secs(), 2);
    assert!(mailbox.state().logged_out);
}

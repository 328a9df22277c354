//! The mailbox watcher: serialized check cycles over an open session.
//!
//! Push notifications and the fallback timer both funnel into
//! [`Watcher::run_check_cycle`]. A [`CheckGate`] keeps at most one cycle in
//! flight and folds every trigger that arrives meanwhile into one re-check.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use inboxhook_imap::UidSet;
use tokio::time::Instant;

use crate::dispatcher::{Dispatcher, PageAutomation, SeenPolicy};
use crate::filter::TargetFilter;
use crate::message::{ActionLink, DecodedEmail, MessageAssembler, RawMessage};
use crate::session::{Activity, MailSession, MailStore};

/// In-flight and re-check flags for check cycles.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckGate {
    in_flight: bool,
    recheck: bool,
}

impl CheckGate {
    /// Creates an idle gate.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            in_flight: false,
            recheck: false,
        }
    }

    /// Registers a trigger. Returns true if the caller should start a cycle;
    /// false if one is already running, in which case a re-check is queued.
    pub const fn request(&mut self) -> bool {
        if self.in_flight {
            self.recheck = true;
            false
        } else {
            self.in_flight = true;
            true
        }
    }

    /// Ends the current cycle. Returns true if a queued re-check should run
    /// now; the gate then stays in flight for it.
    pub const fn finish(&mut self) -> bool {
        if self.recheck {
            self.recheck = false;
            true
        } else {
            self.in_flight = false;
            false
        }
    }

    /// Clears both flags after the session was torn down mid-cycle.
    pub const fn reset(&mut self) {
        self.in_flight = false;
        self.recheck = false;
    }

    /// True while a cycle is running.
    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// True if a re-check is queued.
    #[must_use]
    pub const fn recheck_requested(&self) -> bool {
        self.recheck
    }
}

/// Counters for the cycles run by one [`Watcher::run_check_cycle`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Cycles executed, including coalesced re-checks.
    pub cycles: u32,
    /// Messages returned by the searches.
    pub candidates: u32,
    /// Messages that failed the local sender/subject check.
    pub skipped: u32,
    /// Messages marked seen after a full match.
    pub matched: u32,
    /// Successful automation runs.
    pub dispatched: u32,
    /// Failed automation runs.
    pub failed: u32,
    /// Matched messages without an action link.
    pub missing_link: u32,
}

/// Timing of the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTiming {
    /// Fallback poll interval.
    pub poll_interval: Duration,
}

impl Default for WatchTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Why [`Watcher::watch`] returned.
#[derive(Debug)]
pub enum WatchEnd {
    /// Shutdown was requested between cycles.
    Shutdown,
    /// The session failed and must be discarded.
    Failed(inboxhook_imap::Error),
}

/// Runs check cycles against a mailbox session.
#[derive(Debug)]
pub struct Watcher<A> {
    filter: TargetFilter,
    marker: String,
    dispatcher: Dispatcher<A>,
    seen_policy: SeenPolicy,
    gate: CheckGate,
}

impl<A: PageAutomation> Watcher<A> {
    /// Creates a watcher. `marker` selects the action link among the links of
    /// a matched message.
    pub fn new(filter: TargetFilter, marker: impl Into<String>, automation: A) -> Self {
        Self {
            filter,
            marker: marker.into(),
            dispatcher: Dispatcher::new(automation),
            seen_policy: SeenPolicy::default(),
            gate: CheckGate::new(),
        }
    }

    /// Sets what happens to `\Seen` when automation fails.
    #[must_use]
    pub const fn with_seen_policy(mut self, policy: SeenPolicy) -> Self {
        self.seen_policy = policy;
        self
    }

    /// The gate guarding check cycles.
    #[must_use]
    pub const fn gate(&self) -> &CheckGate {
        &self.gate
    }

    /// The dispatcher wrapping the automation collaborator.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher<A> {
        &self.dispatcher
    }

    /// Forgets any in-flight cycle. Called when the session is discarded.
    pub const fn reset(&mut self) {
        self.gate.reset();
    }

    /// Checks for matching unseen mail.
    ///
    /// Returns immediately with an empty report if a cycle is already in
    /// flight; the trigger is then folded into one re-check. New-mail
    /// announcements received while the cycle runs queue a re-check, which
    /// runs in this call's loop rather than recursively.
    ///
    /// Only connection-level failures are returned; everything else is
    /// logged and ends the current cycle.
    ///
    /// # Errors
    ///
    /// Returns the error when the connection is no longer usable.
    pub async fn run_check_cycle<M: MailStore>(
        &mut self,
        store: &mut M,
    ) -> inboxhook_imap::Result<CycleReport> {
        let mut report = CycleReport::default();
        if !self.gate.request() {
            tracing::debug!("check already in flight, re-check queued");
            return Ok(report);
        }

        loop {
            report.cycles += 1;
            let outcome = self.check_once(store, &mut report).await;

            if store.take_notifications() > 0 {
                self.gate.request();
            }

            match outcome {
                Ok(()) => {}
                Err(e) if e.is_connection_failure() => {
                    self.gate.reset();
                    return Err(e);
                }
                Err(e) => tracing::warn!(error = %e, "check cycle failed"),
            }

            if !self.gate.finish() {
                break;
            }
            tracing::debug!("running queued re-check");
        }

        Ok(report)
    }

    async fn check_once<M: MailStore>(
        &self,
        store: &mut M,
        report: &mut CycleReport,
    ) -> inboxhook_imap::Result<()> {
        let uids = store.search(&self.filter.search_query()).await?;
        if uids.is_empty() {
            tracing::debug!("no matching unseen mail");
            return Ok(());
        }
        report.candidates = report
            .candidates
            .saturating_add(u32::try_from(uids.len()).unwrap_or(u32::MAX));
        tracing::info!(count = uids.len(), "candidate messages found");

        let fetched = store.fetch(&UidSet::from_uids(&uids)).await?;
        let mut assembler = MessageAssembler::new();
        for message in fetched {
            if let Some(raw) = assembler.absorb(message) {
                self.process(store, &raw, report).await?;
            }
        }
        for uid in assembler.incomplete() {
            tracing::warn!(%uid, "message fetch incomplete, leaving it for the next cycle");
        }
        Ok(())
    }

    async fn process<M: MailStore>(
        &self,
        store: &mut M,
        raw: &RawMessage,
        report: &mut CycleReport,
    ) -> inboxhook_imap::Result<()> {
        let uid = raw.uid();
        if raw.is_seen() {
            tracing::debug!(%uid, "already seen, skipping");
            return Ok(());
        }

        let email = DecodedEmail::decode(raw);
        if !self.filter.matches(&email) {
            report.skipped += 1;
            tracing::debug!(
                %uid,
                subject = %email.subject,
                from = %email.from,
                "no match, left unseen"
            );
            return Ok(());
        }

        // A failed STORE ends the cycle before dispatch; the message stays
        // unseen and is retried instead of being dispatched twice.
        store.mark_seen(uid).await?;
        report.matched += 1;
        tracing::info!(%uid, subject = %email.subject, "matched message marked seen");

        let Some(link) = ActionLink::find(&email, &self.marker) else {
            report.missing_link += 1;
            tracing::error!(
                %uid,
                marker = %self.marker,
                links = email.links.len(),
                "no action link in matched message"
            );
            return Ok(());
        };

        match self.dispatcher.dispatch(&link).await {
            Ok(()) => report.dispatched += 1,
            Err(e) => {
                report.failed += 1;
                tracing::error!(%uid, link = %link, error = %e, "automation failed");
                if self.seen_policy == SeenPolicy::RevertToUnseen {
                    match store.mark_unseen(uid).await {
                        Ok(()) => tracing::info!(%uid, "reverted to unseen for retry"),
                        Err(e) => tracing::warn!(%uid, error = %e, "could not revert to unseen"),
                    }
                }
            }
        }
        Ok(())
    }

    /// Drives a session until its connection fails or `shutdown` resolves.
    ///
    /// Runs a cycle immediately, then on every new-mail announcement and
    /// whenever the poll deadline passes. Waits for push events are cut
    /// short at the next poll deadline. `shutdown` is honored between cycles
    /// only; a started cycle always runs to completion or error.
    pub async fn watch<S, F>(
        &mut self,
        session: &mut S,
        timing: WatchTiming,
        mut shutdown: Pin<&mut F>,
    ) -> WatchEnd
    where
        S: MailSession,
        F: Future<Output = ()>,
    {
        let mut next_poll = Instant::now();
        loop {
            let now = Instant::now();
            let due = now >= next_poll;
            if due {
                next_poll = now + timing.poll_interval;
            }

            // Shutdown is checked before every cycle, never during one.
            let activity = tokio::select! {
                biased;
                () = shutdown.as_mut() => return WatchEnd::Shutdown,
                activity = async {
                    if due {
                        Ok(Activity::NewMail)
                    } else {
                        session.wait_for_activity(next_poll - now).await
                    }
                } => activity,
            };

            match activity {
                Ok(Activity::NewMail) => {
                    if let Err(e) = self.run_check_cycle(session).await {
                        return WatchEnd::Failed(e);
                    }
                }
                Ok(Activity::Quiet) => {}
                Err(e) => {
                    self.gate.reset();
                    return WatchEnd::Failed(e);
                }
            }
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

    #[test]
    fn test_gate_first_request_runs() {
        let mut gate = CheckGate::new();
        assert!(gate.request());
        assert!(gate.in_flight());
        assert!(!gate.finish());
        assert!(!gate.in_flight());
    }

    #[test]
    fn test_gate_coalesces_many_triggers_into_one() {
        let mut gate = CheckGate::new();
        assert!(gate.request());
        for _ in 0..7 {
            assert!(!gate.request());
        }
        assert!(gate.recheck_requested());
        assert!(gate.finish());
        assert!(gate.in_flight());
        assert!(!gate.finish());
        assert!(!gate.in_flight());
    }

    #[test]
    fn test_gate_reset() {
        let mut gate = CheckGate::new();
        gate.request();
        gate.request();
        gate.reset();
        assert_eq!(gate, CheckGate::new());
        assert!(gate.request());
    }
}

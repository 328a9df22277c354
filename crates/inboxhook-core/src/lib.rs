//! # inboxhook-core
//!
//! Mailbox watcher logic for inboxhook.
//!
//! This crate provides:
//! - Sender/subject filtering and the server-side search query
//! - Per-message assembly, decoding and action-link extraction
//! - The check cycle with in-flight/re-check coalescing
//! - The reconnect supervisor with exponential backoff
//! - Automation dispatch and the collaborator's persisted state
//! - Startup configuration

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod dispatcher;
mod error;
pub mod filter;
pub mod message;
pub mod session;
pub mod state;
pub mod supervisor;
pub mod watcher;

pub use config::{AutomationTarget, Config, ImapSettings};
pub use dispatcher::{Dispatcher, PageAutomation, SeenPolicy};
pub use error::{ConfigError, DispatchError, Error, Result};
pub use filter::{TargetFilter, build_search_query, sender_matches, subject_matches};
pub use message::{ActionLink, DecodedEmail, MessageAssembler, RawMessage};
pub use session::{Activity, Connector, ImapConnector, ImapSession, MailSession, MailStore};
pub use state::StateStore;
pub use supervisor::{ConnectionState, ReconnectDecision, ReconnectPolicy, RunOutcome, Supervisor};
pub use watcher::{CheckGate, CycleReport, WatchEnd, WatchTiming, Watcher};

//! # inboxhook-imap
//!
//! The IMAP4rev1 subset a mailbox watcher needs: LOGIN over implicit TLS or
//! STARTTLS, SELECT/EXAMINE, UID SEARCH, streaming UID FETCH, UID STORE and
//! IDLE (RFC 2177).
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use inboxhook_imap::{Client, Config, IdleEvent, SearchCriteria};
//!
//! #[tokio::main]
//! async fn main() -> inboxhook_imap::Result<()> {
//!     let config = Config::new("imap.example.com");
//!     let client = Client::connect(&config).await?;
//!     let client = client.login("user@example.com", "app-password").await?;
//!     let (mut client, status) = client.select("INBOX").await?;
//!     println!("{} messages", status.exists);
//!
//!     let unseen = client.uid_search(&SearchCriteria::Unseen).await?;
//!     println!("unseen: {unseen:?}");
//!
//!     if client.supports_idle() {
//!         let mut handle = client.idle().await?;
//!         if let IdleEvent::Exists(n) = handle.wait(Duration::from_secs(600)).await? {
//!             println!("mailbox now holds {n} messages");
//!         }
//!         handle.done().await?;
//!     }
//!
//!     client.logout().await
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! NotAuthenticated ── login() ──→ Authenticated ── select()/examine() ──→ Selected
//! ```
//!
//! Commands are only available in the states where IMAP allows them.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod fetch;
pub mod parser;
pub mod types;

pub use command::{Command, FetchAttribute, SearchCriteria, StoreAction, TagGenerator};
pub use connection::{
    Authenticated, Client, Config, ConfigBuilder, FramedStream, IdleEvent, IdleHandle, ImapStream,
    NotAuthenticated, ResponseAccumulator, Security, Selected,
};
pub use error::{Error, Result};
pub use fetch::{FetchStream, FetchedMessage};
pub use parser::{Response, ResponseParser, UntaggedResponse};
pub use types::{
    Capability, Flag, Flags, MailboxStatus, ResponseCode, SeqNum, Status, Tag, Uid, UidSet,
    UidValidity,
};

//! IMAP connection management.
//!
//! Configuration, plaintext/TLS transports, literal-aware framing, the
//! type-state client and IDLE.

mod client;
mod config;
mod framed;
mod idle;
mod stream;

pub use client::{Authenticated, Client, NotAuthenticated, Selected};
pub(crate) use client::status_to_result;
pub use config::{Config, ConfigBuilder, Security};
pub use framed::{FramedStream, ResponseAccumulator};
pub use idle::{IdleEvent, IdleHandle};
pub use stream::{ImapStream, connect_plain, connect_tls, create_tls_connector};

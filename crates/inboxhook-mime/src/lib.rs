//! # inboxhook-mime
//!
//! Lenient content decoding for notification emails.
//!
//! Every public entry point degrades instead of failing: malformed input is
//! logged through `tracing` and the best partially decoded text is returned.
//!
//! - [`decode_header_word`]: RFC 2047 encoded words (`=?charset?B|Q?text?=`)
//! - [`decode_body`]: Base64 and Quoted-Printable bodies, including base64
//!   parts inside a multipart body
//! - [`extract_links`]: ordered `http`/`https` links in decoded text
//! - [`Headers`]: unfolded, case-insensitive header block
//!
//! ```
//! use inboxhook_mime::{decode_body, decode_header_word, extract_links};
//!
//! let subject = decode_header_word("=?utf-8?Q?Your_Household?=");
//! assert_eq!(subject, "Your Household");
//!
//! let body = decode_body("see https://x.test/?t=3Dabc", "Content-Transfer-Encoding: quoted-printable");
//! assert_eq!(extract_links(&body), vec!["https://x.test/?t=abc"]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod body;
mod error;
mod header;
mod link;
mod word;

pub mod encoding;

pub use body::{TransferEncoding, decode_body};
pub use error::{Error, Result};
pub use header::Headers;
pub use link::extract_links;
pub use word::{WordEncoding, decode_header_word, encode_header_word};

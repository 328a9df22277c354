//! Sans-I/O parser for IMAP server responses.
//!
//! The [`Lexer`] splits a response into tokens and [`ResponseParser`] builds
//! a [`Response`] from them. Only the response kinds a watcher acts on are
//! interpreted; anything else parses as [`UntaggedResponse::Other`].
//!
//! ```
//! use inboxhook_imap::parser::{Response, ResponseParser, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* 12 EXISTS\r\n").unwrap();
//! assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(12)));
//! ```

pub mod lexer;
pub mod response;

pub use lexer::{Lexer, Token};
pub use response::{FetchItem, Response, ResponseParser, UntaggedResponse};

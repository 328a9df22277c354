//! IMAP response parser.

#![allow(clippy::missing_errors_doc)]

mod fetch;
mod helpers;
mod types;

pub use types::{FetchItem, UntaggedResponse};

use crate::parser::lexer::{Lexer, Token};
use crate::types::{ResponseCode, SeqNum, Status, Tag};
use crate::{Error, Result};

use helpers::{
    parse_capability_data, parse_flag_list, parse_response_code, parse_search_response,
    read_text_until_crlf,
};

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: Tag,
        /// Completion status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Optional text.
        text: Option<String>,
    },
}

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses one complete response, literals included.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);

        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer, input),
            Token::Plus => Ok(Self::parse_continuation(&mut lexer)),
            Token::Atom(tag) => Self::parse_tagged(&mut lexer, tag),
            token => Err(Error::Parse {
                position: 0,
                message: format!("Expected *, +, or tag, got {token:?}"),
            }),
        }
    }

    fn parse_tagged(lexer: &mut Lexer<'_>, tag: &str) -> Result<Response> {
        lexer.expect_space()?;
        let status = Self::parse_status(lexer)?;
        let (code, text) = Self::parse_resp_text(lexer)?;

        Ok(Response::Tagged {
            tag: Tag::new(tag),
            status,
            code,
            text,
        })
    }

    fn parse_untagged(lexer: &mut Lexer<'_>, input: &[u8]) -> Result<Response> {
        lexer.expect_space()?;

        let untagged = match lexer.next_token()? {
            Token::Atom(keyword) => match keyword.to_ascii_uppercase().as_str() {
                "OK" => {
                    let (code, text) = Self::parse_resp_text(lexer)?;
                    UntaggedResponse::Ok { code, text }
                }
                "NO" => {
                    let (code, text) = Self::parse_resp_text(lexer)?;
                    UntaggedResponse::No { code, text }
                }
                "BAD" => {
                    let (code, text) = Self::parse_resp_text(lexer)?;
                    UntaggedResponse::Bad { code, text }
                }
                "PREAUTH" => {
                    let (code, text) = Self::parse_resp_text(lexer)?;
                    UntaggedResponse::PreAuth { code, text }
                }
                "BYE" => {
                    let (code, text) = Self::parse_resp_text(lexer)?;
                    UntaggedResponse::Bye { code, text }
                }
                "CAPABILITY" => UntaggedResponse::Capability(parse_capability_data(lexer)?),
                "FLAGS" => {
                    lexer.expect_space()?;
                    UntaggedResponse::Flags(parse_flag_list(lexer)?)
                }
                "SEARCH" => UntaggedResponse::Search(parse_search_response(lexer)?),
                _ => UntaggedResponse::Other(raw_line(input)),
            },
            Token::Number(n) => {
                lexer.expect_space()?;
                let keyword = lexer.read_atom_string()?;
                match keyword.to_ascii_uppercase().as_str() {
                    "EXISTS" => UntaggedResponse::Exists(n),
                    "RECENT" => UntaggedResponse::Recent(n),
                    "EXPUNGE" => UntaggedResponse::Expunge(
                        SeqNum::new(n).ok_or_else(|| lexer.error("Invalid sequence number 0"))?,
                    ),
                    "FETCH" => {
                        let seq =
                            SeqNum::new(n).ok_or_else(|| lexer.error("Invalid sequence number 0"))?;
                        lexer.expect_space()?;
                        let items = fetch::parse_fetch_response(lexer)?;
                        UntaggedResponse::Fetch { seq, items }
                    }
                    _ => UntaggedResponse::Other(raw_line(input)),
                }
            }
            token => {
                return Err(lexer.error(&format!(
                    "Unexpected token in untagged response: {token:?}"
                )));
            }
        };

        Ok(Response::Untagged(untagged))
    }

    fn parse_continuation(lexer: &mut Lexer<'_>) -> Response {
        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }
        let text = read_text_until_crlf(lexer);
        Response::Continuation {
            text: (!text.is_empty()).then_some(text),
        }
    }

    fn parse_status(lexer: &mut Lexer<'_>) -> Result<Status> {
        let s = lexer.read_atom_string()?;
        match s.to_ascii_uppercase().as_str() {
            "OK" => Ok(Status::Ok),
            "NO" => Ok(Status::No),
            "BAD" => Ok(Status::Bad),
            "PREAUTH" => Ok(Status::PreAuth),
            "BYE" => Ok(Status::Bye),
            _ => Err(lexer.error(&format!("Invalid status: {s}"))),
        }
    }

    /// Parses `[SP] ["[" code "]"] [SP] text`. Some servers omit the text.
    fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }

        let code = if lexer.peek() == Some(b'[') {
            Some(parse_response_code(lexer)?)
        } else {
            None
        };

        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }

        Ok((code, read_text_until_crlf(lexer)))
    }
}

fn raw_line(input: &[u8]) -> String {
    String::from_utf8_lossy(input)
        .trim_end_matches(['\r', '\n'])
        .to_string()
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
    use proptest::prelude::*;

    use super::*;
    use crate::types::{Capability, Flag, Uid};

    #[test]
    fn test_parse_greeting_with_capabilities() {
        let input = b"* OK [CAPABILITY IMAP4rev1 IDLE AUTH=PLAIN] Dovecot ready.\r\n";
        match ResponseParser::parse(input).unwrap() {
            Response::Untagged(UntaggedResponse::Ok {
                code: Some(ResponseCode::Capability(caps)),
                text,
            }) => {
                assert!(caps.contains(&Capability::Idle));
                assert!(caps.contains(&Capability::Auth("PLAIN".to_string())));
                assert_eq!(text, "Dovecot ready.");
            }
            other => panic!("Expected greeting, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_tagged_no() {
        let input = b"W0003 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n";
        match ResponseParser::parse(input).unwrap() {
            Response::Tagged {
                tag,
                status,
                code,
                text,
            } => {
                assert_eq!(tag.as_str(), "W0003");
                assert_eq!(status, Status::No);
                assert_eq!(
                    code,
                    Some(ResponseCode::Other("AUTHENTICATIONFAILED".to_string()))
                );
                assert_eq!(text, "Invalid credentials");
            }
            other => panic!("Expected tagged, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_tagged_without_text() {
        let response = ResponseParser::parse(b"W0001 OK\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Tagged { status: Status::Ok, ref text, .. } if text.is_empty()
        ));
    }

    #[test]
    fn test_parse_exists_and_recent() {
        assert_eq!(
            ResponseParser::parse(b"* 23 EXISTS\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Exists(23))
        );
        assert_eq!(
            ResponseParser::parse(b"* 2 RECENT\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Recent(2))
        );
    }

    #[test]
    fn test_parse_search() {
        assert_eq!(
            ResponseParser::parse(b"* SEARCH 4 9 12\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Search(vec![4, 9, 12]))
        );
        assert_eq!(
            ResponseParser::parse(b"* SEARCH\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Search(vec![]))
        );
    }

    #[test]
    fn test_parse_permanent_flags_wildcard() {
        let input = b"* OK [PERMANENTFLAGS (\\Seen \\Deleted \\*)] Limited\r\n";
        match ResponseParser::parse(input).unwrap() {
            Response::Untagged(UntaggedResponse::Ok {
                code: Some(ResponseCode::PermanentFlags(flags)),
                ..
            }) => {
                assert!(flags.contains(&Flag::Seen));
                assert!(flags.contains(&Flag::Keyword("\\*".to_string())));
            }
            other => panic!("Expected PERMANENTFLAGS, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_fetch_with_literals() {
        let input = b"* 3 FETCH (UID 42 FLAGS () BODY[HEADER] {9}\r\nSubject:\n BODY[TEXT] {4}\r\nbody)\r\n";
        match ResponseParser::parse(input).unwrap() {
            Response::Untagged(UntaggedResponse::Fetch { seq, items }) => {
                assert_eq!(seq.get(), 3);
                assert_eq!(items[0], FetchItem::Uid(Uid::new(42).unwrap()));
                assert!(matches!(&items[1], FetchItem::Flags(f) if f.is_empty()));
                assert_eq!(
                    items[2],
                    FetchItem::Body {
                        section: Some("HEADER".to_string()),
                        origin: None,
                        data: Some(b"Subject:\n".to_vec()),
                    }
                );
                assert_eq!(
                    items[3],
                    FetchItem::Body {
                        section: Some("TEXT".to_string()),
                        origin: None,
                        data: Some(b"body".to_vec()),
                    }
                );
            }
            other => panic!("Expected FETCH, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_fetch_quoted_and_nil_bodies() {
        let input = b"* 1 FETCH (BODY[TEXT] \"hi\" BODY[HEADER] NIL UID 7)\r\n";
        match ResponseParser::parse(input).unwrap() {
            Response::Untagged(UntaggedResponse::Fetch { items, .. }) => {
                assert!(matches!(&items[0], FetchItem::Body { data: Some(d), .. } if d == b"hi"));
                assert!(matches!(&items[1], FetchItem::Body { data: None, .. }));
                assert_eq!(items[2], FetchItem::Uid(Uid::new(7).unwrap()));
            }
            other => panic!("Expected FETCH, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_fetch_skips_unrequested_items() {
        let input = b"* 1 FETCH (MODSEQ (12345) INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" UID 5)\r\n";
        match ResponseParser::parse(input).unwrap() {
            Response::Untagged(UntaggedResponse::Fetch { items, .. }) => {
                assert_eq!(items, vec![FetchItem::Uid(Uid::new(5).unwrap())]);
            }
            other => panic!("Expected FETCH, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_untagged_is_other() {
        assert_eq!(
            ResponseParser::parse(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Other(
                "* LIST (\\HasNoChildren) \"/\" INBOX".to_string()
            ))
        );
        assert!(matches!(
            ResponseParser::parse(b"* 4 VANISHED\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Other(_))
        ));
    }

    #[test]
    fn test_parse_continuation() {
        assert_eq!(
            ResponseParser::parse(b"+ idling\r\n").unwrap(),
            Response::Continuation {
                text: Some("idling".to_string())
            }
        );
        assert_eq!(
            ResponseParser::parse(b"+\r\n").unwrap(),
            Response::Continuation { text: None }
        );
    }

    #[test]
    fn test_parse_bye() {
        match ResponseParser::parse(b"* BYE Autologout; idle for too long\r\n").unwrap() {
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                assert_eq!(text, "Autologout; idle for too long");
            }
            other => panic!("Expected BYE, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_sequence_rejected() {
        assert!(ResponseParser::parse(b"* 0 FETCH (UID 1)\r\n").is_err());
    }

    proptest! {
        #[test]
        fn prop_parser_never_panics(input in proptest::collection::vec(any::<u8>(), 0..200)) {
            let _ = ResponseParser::parse(&input);
        }

        #[test]
        fn prop_fetch_shaped_input_never_panics(body in "[ -~]{0,80}") {
            let line = format!("* 1 FETCH ({body})\r\n");
            let _ = ResponseParser::parse(line.as_bytes());
        }
    }
}

//! FETCH response parsing.

use crate::parser::lexer::{Lexer, Token};
use crate::types::Uid;
use crate::{Error, Result};

use super::helpers::parse_flag_list;
use super::types::FetchItem;

/// Parses the parenthesized item list of a FETCH response.
pub fn parse_fetch_response(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(name) => match name.to_ascii_uppercase().as_str() {
                "FLAGS" => {
                    lexer.expect_space()?;
                    items.push(FetchItem::Flags(parse_flag_list(lexer)?));
                }
                "UID" => {
                    lexer.expect_space()?;
                    let n = lexer.read_number()?;
                    let uid = Uid::new(n).ok_or_else(|| lexer.error("UID cannot be 0"))?;
                    items.push(FetchItem::Uid(uid));
                }
                "RFC822.SIZE" => {
                    lexer.expect_space()?;
                    items.push(FetchItem::Rfc822Size(lexer.read_number()?));
                }
                "BODY" | "BINARY" | "RFC822" | "RFC822.HEADER" | "RFC822.TEXT" => {
                    let (section, origin) = parse_body_section_and_origin(lexer);
                    let section = section.or_else(|| rfc822_section(name));
                    lexer.expect_space()?;
                    let data = lexer.read_nstring_bytes()?;
                    items.push(FetchItem::Body {
                        section,
                        origin,
                        data,
                    });
                }
                _ => {
                    tracing::trace!(item = name, "skipping unrequested fetch item");
                    skip_fetch_value(lexer)?;
                }
            },
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in FETCH: {token:?}"),
                });
            }
        }
    }

    Ok(items)
}

/// Maps the RFC822 aliases onto their BODY section names.
fn rfc822_section(name: &str) -> Option<String> {
    match name.to_ascii_uppercase().as_str() {
        "RFC822.HEADER" => Some("HEADER".to_string()),
        "RFC822.TEXT" => Some("TEXT".to_string()),
        _ => None,
    }
}

/// Reads `[section]` and `<origin>` following BODY byte by byte; section
/// specifiers contain characters the tokenizer does not treat as atoms.
fn parse_body_section_and_origin(lexer: &mut Lexer<'_>) -> (Option<String>, Option<u32>) {
    let mut section = None;
    let mut origin = None;

    if lexer.peek() == Some(b'[') {
        lexer.advance();
        let mut buf = String::new();
        while let Some(b) = lexer.advance() {
            if b == b']' {
                break;
            }
            buf.push(char::from(b));
        }
        if !buf.is_empty() {
            section = Some(buf);
        }
    }

    if lexer.peek() == Some(b'<') {
        lexer.advance();
        let mut buf = String::new();
        while let Some(b) = lexer.peek().filter(u8::is_ascii_digit) {
            buf.push(char::from(b));
            lexer.advance();
        }
        if lexer.peek() == Some(b'>') {
            lexer.advance();
        }
        origin = buf.parse().ok();
    }

    (section, origin)
}

/// Skips the value of a fetch item this client never requests, including
/// nested lists such as ENVELOPE or BODYSTRUCTURE.
fn skip_fetch_value(lexer: &mut Lexer<'_>) -> Result<()> {
    // Items like `BODY[...]`-style names may carry a bracketed suffix.
    if lexer.peek() == Some(b'[') {
        parse_body_section_and_origin(lexer);
    }
    lexer.expect_space()?;

    let mut depth = 0usize;
    loop {
        match lexer.next_token()? {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth.checked_sub(1).ok_or_else(|| lexer.error("Unbalanced )"))?;
            }
            Token::Eof | Token::Crlf => return Err(lexer.error("Unterminated FETCH item")),
            _ => {}
        }
        if depth == 0 && matches!(lexer.peek(), Some(b' ' | b')')) {
            return Ok(());
        }
    }
}

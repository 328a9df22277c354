//! Tokenizer for IMAP server responses.
//!
//! Works on one complete response (including any literals) at a time; the
//! framing layer guarantees literal payloads are already in the buffer.

#![allow(clippy::missing_errors_doc)]

mod token;

pub use token::Token;

use crate::{Error, Result};

/// IMAP lexer state.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns the current position in the input.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Returns the unconsumed input.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    /// Returns true if at end of input.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Peeks at the current byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    /// Advances by one byte and returns it.
    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Skips up to `n` bytes.
    pub fn skip(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n).min(self.input.len());
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        match byte {
            b'\r' => {
                if self.peek_at(1) == Some(b'\n') {
                    self.skip(2);
                    Ok(Token::Crlf)
                } else {
                    Err(self.error("Expected LF after CR"))
                }
            }
            b' ' => self.single(Token::Space),
            b'(' => self.single(Token::LParen),
            b')' => self.single(Token::RParen),
            b'[' => self.single(Token::LBracket),
            b']' => self.single(Token::RBracket),
            b'*' => self.single(Token::Asterisk),
            b'+' => self.single(Token::Plus),
            b'"' => self.read_quoted_string(),
            b'{' => self.read_literal(),
            _ if is_atom_char(byte) => self.read_word(),
            _ => Err(self.error(&format!("Unexpected character: {byte:#04x}"))),
        }
    }

    fn single(&mut self, token: Token<'a>) -> Result<Token<'a>> {
        self.advance();
        Ok(token)
    }

    /// Reads a quoted string. Non-UTF-8 content is decoded lossily; servers
    /// put raw 8-bit header text in quoted strings often enough.
    fn read_quoted_string(&mut self) -> Result<Token<'a>> {
        self.advance();
        let mut bytes = Vec::new();

        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(c @ (b'"' | b'\\')) => bytes.push(c),
                    Some(c) => return Err(self.error(&format!("Invalid escape: \\{}", char::from(c)))),
                    None => return Err(self.error("Unexpected EOF in quoted string")),
                },
                Some(c) => bytes.push(c),
                None => return Err(self.error("Unexpected EOF in quoted string")),
            }
        }

        Ok(Token::QuotedString(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    }

    /// Reads `{n}` CRLF followed by `n` bytes. `{n+}` (LITERAL+) is accepted.
    fn read_literal(&mut self) -> Result<Token<'a>> {
        self.advance();
        let start = self.pos;

        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' | b'+' => {
                    self.advance();
                }
                b'}' => break,
                _ => return Err(self.error("Invalid character in literal size")),
            }
        }

        let digits = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid literal size"))?
            .trim_end_matches('+');
        let size: usize = digits
            .parse()
            .map_err(|_| self.error("Invalid literal size number"))?;

        if self.advance() != Some(b'}') {
            return Err(self.error("Expected } after literal size"));
        }
        if self.advance() != Some(b'\r') || self.advance() != Some(b'\n') {
            return Err(self.error("Expected CRLF after literal size"));
        }

        let end = self
            .pos
            .checked_add(size)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| self.error("Incomplete literal data"))?;

        let data = self.input[self.pos..end].to_vec();
        self.pos = end;
        Ok(Token::Literal(data))
    }

    /// Reads a run of atom characters: all digits is a number, `NIL` in
    /// any case is nil, anything else an atom.
    fn read_word(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        while self.peek().is_some_and(is_atom_char) {
            self.advance();
        }
        let word = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid UTF-8 in atom"))?;

        if word.bytes().all(|b| b.is_ascii_digit()) {
            word.parse()
                .map(Token::Number)
                .map_err(|_| self.error("Number too large"))
        } else if word.eq_ignore_ascii_case("NIL") {
            Ok(Token::Nil)
        } else {
            Ok(Token::Atom(word))
        }
    }

    /// Creates a parse error at the current position.
    pub(crate) fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    /// Expects and consumes a token of the same kind as `expected`.
    #[allow(clippy::needless_pass_by_value)]
    pub fn expect(&mut self, expected: Token<'_>) -> Result<()> {
        let token = self.next_token()?;
        if std::mem::discriminant(&token) == std::mem::discriminant(&expected) {
            Ok(())
        } else {
            Err(self.error(&format!("Expected {expected:?}, got {token:?}")))
        }
    }

    /// Expects and consumes a space.
    pub fn expect_space(&mut self) -> Result<()> {
        self.expect(Token::Space)
    }

    /// Reads a number.
    pub fn read_number(&mut self) -> Result<u32> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            token => Err(self.error(&format!("Expected number, got {token:?}"))),
        }
    }

    /// Reads an atom.
    pub fn read_atom_string(&mut self) -> Result<&'a str> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s),
            token => Err(self.error(&format!("Expected atom, got {token:?}"))),
        }
    }

    /// Reads an nstring (NIL, quoted string or literal) as raw bytes.
    pub fn read_nstring_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::QuotedString(s) => Ok(Some(s.into_bytes())),
            Token::Literal(data) => Ok(Some(data)),
            token => Err(self.error(&format!("Expected nstring, got {token:?}"))),
        }
    }
}

/// Returns true if the byte may appear in an atom.
///
/// `\` is accepted so system flags such as `\Seen` lex as one atom.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    matches!(b,
        0x21 | 0x23..=0x24 | 0x26..=0x27 |
        0x2B..=0x5A |
        0x5C |
        0x5E..=0x7A |
        0x7C |
        0x7E
    )
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
    fn test_tagged_response_tokens() {
        let mut lexer = Lexer::new(b"W0001 OK LOGIN completed\r\n");
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("W0001"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("OK"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("LOGIN"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("completed"));
        assert_eq!(lexer.next_token().unwrap(), Token::Crlf);
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn test_numbers_and_number_like_atoms() {
        let mut lexer = Lexer::new(b"123 4:7 99999999999");
        assert_eq!(lexer.next_token().unwrap(), Token::Number(123));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("4:7"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn test_quoted_string_escapes() {
        let mut lexer = Lexer::new(b"\"say \\\"hi\\\" \\\\ ok\"");
        assert_eq!(
            lexer.next_token().unwrap(),
            Token::QuotedString("say \"hi\" \\ ok".to_string())
        );
    }

    #[test]
    fn test_quoted_string_non_utf8_is_lossy() {
        let mut lexer = Lexer::new(b"\"caf\xe9\"");
        assert_eq!(
            lexer.next_token().unwrap(),
            Token::QuotedString("caf\u{FFFD}".to_string())
        );
    }

    #[test]
    fn test_words_starting_with_digits_or_nil() {
        let mut lexer = Lexer::new(b"4NIL NILS 0");
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("4NIL"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("NILS"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Number(0));
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn test_nil_any_case() {
        let mut lexer = Lexer::new(b"NIL nil");
        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
    }

    #[test]
    fn test_flag_list() {
        let mut lexer = Lexer::new(b"(\\Seen $Forwarded)");
        assert_eq!(lexer.next_token().unwrap(), Token::LParen);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("\\Seen"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("$Forwarded"));
        assert_eq!(lexer.next_token().unwrap(), Token::RParen);
    }

    #[test]
    fn test_literal() {
        let mut lexer = Lexer::new(b"{5}\r\nhello)");
        assert_eq!(lexer.next_token().unwrap(), Token::Literal(b"hello".to_vec()));
        assert_eq!(lexer.next_token().unwrap(), Token::RParen);
    }

    #[test]
    fn test_literal_plus() {
        let mut lexer = Lexer::new(b"{3+}\r\nabc");
        assert_eq!(lexer.next_token().unwrap(), Token::Literal(b"abc".to_vec()));
    }

    #[test]
    fn test_truncated_literal_is_error() {
        let mut lexer = Lexer::new(b"{10}\r\nabc");
        assert!(lexer.next_token().is_err());
        let mut huge = Lexer::new(b"{18446744073709551615}\r\n");
        assert!(huge.next_token().is_err());
    }

    #[test]
    fn test_is_atom_char() {
        assert!(is_atom_char(b'A'));
        assert!(is_atom_char(b'\\'));
        assert!(is_atom_char(b'.'));
        assert!(!is_atom_char(b' '));
        assert!(!is_atom_char(b'"'));
        assert!(!is_atom_char(b'%'));
        assert!(!is_atom_char(b'*'));
        assert!(!is_atom_char(b'['));
        assert!(!is_atom_char(b']'));
        assert!(!is_atom_char(b'{'));
    }
}

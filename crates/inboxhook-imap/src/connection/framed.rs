//! Framed I/O for the IMAP wire format.
//!
//! Responses are CRLF-terminated lines that may embed `{n}` literals; a
//! literal's payload follows the line and the response continues after it.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::{Error, Result};

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Maximum literal size.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024;

/// Framed connection: literal-aware reads, buffered writes.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Reads one complete response, including any embedded literals.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            let Some(literal_len) = parse_literal_length(&line) else {
                break;
            };
            if literal_len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }
            let mut literal = vec![0u8; literal_len];
            self.reader.read_exact(&mut literal).await?;
            response.extend_from_slice(&literal);
        }

        Ok(response)
    }

    /// Reads one response, failing with [`Error::Timeout`] after `limit`.
    pub async fn read_response_within(&mut self, limit: Duration) -> Result<Vec<u8>> {
        tokio::time::timeout(limit, self.read_response())
            .await
            .map_err(|_| Error::Timeout(limit))?
    }

    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            if let Some(pos) = find_crlf(buf) {
                line.extend_from_slice(&buf[..pos + 2]);
                self.reader.consume(pos + 2);
                break;
            }

            // Keep a trailing CR so a CRLF split across reads is still found.
            let take = if buf.ends_with(b"\r") { buf.len() - 1 } else { buf.len() };
            if take == 0 {
                line.push(b'\r');
                self.reader.consume(1);
                if self.reader.fill_buf().await?.first() == Some(&b'\n') {
                    line.push(b'\n');
                    self.reader.consume(1);
                    break;
                }
                continue;
            }
            line.extend_from_slice(&buf[..take]);
            self.reader.consume(take);

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }

        Ok(line)
    }

    /// Writes a serialized command and flushes.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Buffered unread data is lost; only call at a protocol boundary such as
    /// right after the tagged STARTTLS reply.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a literal length from the end of a line: `{123}\r\n` or `{123+}\r\n`.
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);
    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Reads responses until the tagged completion for one command.
///
/// Remembers the text of an untagged BYE so that a connection closed right
/// after it surfaces as [`Error::Bye`] instead of a bare EOF.
pub struct ResponseAccumulator {
    tag: String,
    responses: Vec<Vec<u8>>,
    bye: Option<String>,
}

impl ResponseAccumulator {
    /// Creates a new response accumulator for the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            responses: Vec::new(),
            bye: None,
        }
    }

    /// Returns true if `response` is the tagged completion for our tag.
    #[must_use]
    pub fn is_completion(&self, response: &[u8]) -> bool {
        response
            .strip_prefix(self.tag.as_bytes())
            .is_some_and(|rest| rest.first() == Some(&b' '))
    }

    /// Records a BYE if `response` is one.
    pub fn observe(&mut self, response: &[u8]) {
        if response.starts_with(b"* ")
            && let Ok(Response::Untagged(UntaggedResponse::Bye { text, .. })) =
                ResponseParser::parse(response)
        {
            self.bye = Some(text);
        }
    }

    /// Converts an EOF that followed a BYE into [`Error::Bye`].
    pub fn explain(&mut self, err: Error) -> Error {
        match (err, self.bye.take()) {
            (Error::Io(e), Some(text)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Error::Bye(text)
            }
            (err, _) => err,
        }
    }

    /// Reads responses until the tagged response matching our tag.
    pub async fn read_until_tagged<S>(
        &mut self,
        framed: &mut FramedStream<S>,
        limit: Duration,
    ) -> Result<Vec<Vec<u8>>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let response = match framed.read_response_within(limit).await {
                Ok(response) => response,
                Err(e) => return Err(self.explain(e)),
            };

            self.observe(&response);
            let done = self.is_completion(&response);
            self.responses.push(response);

            if done {
                break;
            }
        }

        Ok(std::mem::take(&mut self.responses))
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
    use tokio_test::io::Builder;

    use super::*;

    const LIMIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"hello\r\n"), Some(5));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"just\n"), None);
        assert_eq!(find_crlf(b"just\r"), None);
    }

    #[test]
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"BODY[TEXT] {123}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"BODY[TEXT] {123+}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(parse_literal_length(b"no literal\r\n"), None);
        assert_eq!(parse_literal_length(b"incomplete {123"), None);
        assert_eq!(parse_literal_length(b"wrong {abc}\r\n"), None);
        assert_eq!(parse_literal_length(b"empty {}\r\n"), None);
    }

    #[tokio::test]
    async fn test_read_simple_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(framed.read_response().await.unwrap(), b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_read_crlf_split_across_reads() {
        let mock = Builder::new().read(b"* 3 EXISTS\r").read(b"\n").build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(framed.read_response().await.unwrap(), b"* 3 EXISTS\r\n");
    }

    #[tokio::test]
    async fn test_read_with_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (UID 9 BODY[TEXT] {5}\r\n")
            .read(b"hello)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(
            framed.read_response().await.unwrap(),
            b"* 1 FETCH (UID 9 BODY[TEXT] {5}\r\nhello)\r\n"
        );
    }

    #[tokio::test]
    async fn test_write_command() {
        let mock = Builder::new().write(b"W0001 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock);
        framed.write_command(b"W0001 NOOP\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_accumulator_stops_at_own_tag() {
        let mock = Builder::new()
            .read(b"* 4 EXISTS\r\n")
            .read(b"W00010 OK other\r\n")
            .read(b"W0001 OK done\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        let responses = ResponseAccumulator::new("W0001")
            .read_until_tagged(&mut framed, LIMIT)
            .await
            .unwrap();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[2], b"W0001 OK done\r\n");
    }

    #[tokio::test]
    async fn test_eof_after_bye_is_bye() {
        let mock = Builder::new()
            .read(b"* BYE server shutting down\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        let err = ResponseAccumulator::new("W0001")
            .read_until_tagged(&mut framed, LIMIT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Bye(ref text) if text == "server shutting down"));
    }

    #[tokio::test]
    async fn test_bare_eof_is_io() {
        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock);
        let err = framed.read_response().await.unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_timeout() {
        let mock = Builder::new().wait(Duration::from_secs(60)).build();
        let mut framed = FramedStream::new(mock);
        let err = framed
            .read_response_within(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_literal_size_validation() {
        let header = format!("* 1 FETCH (BODY[] {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);
        let err = framed.read_response().await.unwrap_err();
        assert!(err.to_string().contains("literal too large"));
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);
        let err = framed.read_response().await.unwrap_err();
        assert!(err.to_string().contains("line too long"));
    }
}

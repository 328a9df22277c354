//! Transfer encoding primitives.
//!
//! Base64 and Quoted-Printable (RFC 2045), plus the "Q" variant used inside
//! RFC 2047 encoded words.

use std::fmt::Write as _;

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::error::{Error, Result};

/// Base64 engine that tolerates missing or superfluous padding.
///
/// Mail relays routinely drop trailing `=` from wrapped bodies.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data, ignoring embedded whitespace and padding errors.
///
/// # Errors
///
/// Returns an error if the input contains bytes outside the Base64 alphabet.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    LENIENT.decode(compact).map_err(Into::into)
}

/// Outcome of a lenient Quoted-Printable decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedPrintable {
    /// Decoded bytes.
    pub bytes: Vec<u8>,
    /// Number of `=` escapes that were not valid and were kept verbatim.
    pub invalid_escapes: usize,
}

/// Decodes Quoted-Printable text without ever failing.
///
/// Soft line breaks (`=` followed by CRLF, LF or end of input) are removed
/// and `=XX` hex escapes become the corresponding byte. Any other `=` is kept
/// literally and counted in [`QuotedPrintable::invalid_escapes`].
#[must_use]
pub fn decode_quoted_printable_lenient(text: &str) -> QuotedPrintable {
    let input = text.as_bytes();
    let mut bytes = Vec::with_capacity(input.len());
    let mut invalid_escapes = 0;
    let mut i = 0;

    while i < input.len() {
        let b = input[i];
        if b != b'=' {
            bytes.push(b);
            i += 1;
            continue;
        }

        match (input.get(i + 1), input.get(i + 2)) {
            (None, _) => i += 1,
            (Some(b'\n'), _) => i += 2,
            (Some(b'\r'), Some(b'\n')) => i += 3,
            (Some(&hi), Some(&lo)) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                bytes.push((hex_value(hi) << 4) | hex_value(lo));
                i += 3;
            }
            _ => {
                invalid_escapes += 1;
                bytes.push(b'=');
                i += 1;
            }
        }
    }

    QuotedPrintable {
        bytes,
        invalid_escapes,
    }
}

/// Encodes bytes with the RFC 2047 "Q" encoding.
///
/// Spaces become `_`; everything outside a conservative safe set is hex
/// escaped so the result can sit inside an encoded word.
#[must_use]
pub fn encode_q(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len());
    for &byte in data {
        match byte {
            b' ' => result.push('_'),
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'!' | b'*' | b'+' | b'-' | b'/' => {
                result.push(char::from(byte));
            }
            _ => {
                let _ = write!(result, "={byte:02X}");
            }
        }
    }
    result
}

/// Decodes RFC 2047 "Q" encoded text.
///
/// # Errors
///
/// Returns an error on a truncated or non-hex `=` escape.
pub fn decode_q(text: &str) -> Result<Vec<u8>> {
    let input = text.as_bytes();
    let mut bytes = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        match input[i] {
            b'_' => {
                bytes.push(b' ');
                i += 1;
            }
            b'=' => {
                let (Some(&hi), Some(&lo)) = (input.get(i + 1), input.get(i + 2)) else {
                    return Err(Error::InvalidEncoding(
                        "Incomplete escape sequence".to_string(),
                    ));
                };
                if !hi.is_ascii_hexdigit() || !lo.is_ascii_hexdigit() {
                    return Err(Error::InvalidEncoding(format!(
                        "Invalid hex escape: ={}{}",
                        char::from(hi),
                        char::from(lo)
                    )));
                }
                bytes.push((hex_value(hi) << 4) | hex_value(lo));
                i += 3;
            }
            b => {
                bytes.push(b);
                i += 1;
            }
        }
    }

    Ok(bytes)
}

const fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
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
    fn test_base64_ignores_line_wrapping() {
        let decoded = decode_base64("SGVsbG8s\r\nIFdvcmxk\r\nIQ==\r\n").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_missing_padding() {
        assert_eq!(decode_base64("SGk").unwrap(), b"Hi");
    }

    #[test]
    fn test_base64_rejects_garbage() {
        assert!(decode_base64("not*base64").is_err());
    }

    #[test]
    fn test_qp_soft_breaks_and_escapes() {
        let qp = decode_quoted_printable_lenient("token=3Dabc=\r\n&x=3D1=\nend");
        assert_eq!(qp.bytes, b"token=abc&x=1end");
        assert_eq!(qp.invalid_escapes, 0);
    }

    #[test]
    fn test_qp_lowercase_hex() {
        let qp = decode_quoted_printable_lenient("caf=c3=a9");
        assert_eq!(String::from_utf8(qp.bytes).unwrap(), "café");
    }

    #[test]
    fn test_qp_invalid_escape_kept() {
        let qp = decode_quoted_printable_lenient("a=zz b=");
        assert_eq!(qp.bytes, b"a=zz b");
        assert_eq!(qp.invalid_escapes, 1);
    }

    #[test]
    fn test_q_underscore_is_space() {
        assert_eq!(decode_q("Hello_World=21").unwrap(), b"Hello World!");
    }

    #[test]
    fn test_q_truncated_escape() {
        assert!(decode_q("abc=4").is_err());
        assert!(decode_q("abc=zz").is_err());
    }

    #[test]
    fn test_q_encode() {
        assert_eq!(encode_q("a b?=".as_bytes()), "a_b=3F=3D");
    }
}

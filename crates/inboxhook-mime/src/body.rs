//! Body decoding by `Content-Transfer-Encoding`.

use std::sync::LazyLock;

use regex::Regex;

use crate::encoding::{decode_base64, decode_quoted_printable_lenient};
use crate::header::Headers;

/// A base64 part inside a multipart body: the part's encoding header, any
/// further part headers, the blank separator line, then the payload block.
static BASE64_PART: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)content-transfer-encoding:[ \t]*base64[ \t]*\r?\n(?:[^\r\n]+\r?\n)*?\r?\n([A-Za-z0-9+/=\s]+)",
    )
    .ok()
});

static QP_PART: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)content-transfer-encoding:[ \t]*quoted-printable").ok()
});

/// Content transfer encoding of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit data.
    EightBit,
    /// Raw binary.
    Binary,
    /// Quoted-Printable.
    QuotedPrintable,
    /// Base64.
    Base64,
    /// Header absent or unrecognised.
    #[default]
    Unspecified,
}

impl TransferEncoding {
    /// Parses a header value, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "7bit" => Self::SevenBit,
            "8bit" => Self::EightBit,
            "binary" => Self::Binary,
            "quoted-printable" => Self::QuotedPrintable,
            "base64" => Self::Base64,
            _ => Self::Unspecified,
        }
    }

    /// Reads the encoding from a parsed header block.
    #[must_use]
    pub fn from_headers(headers: &Headers) -> Self {
        headers
            .transfer_encoding()
            .map_or(Self::Unspecified, |v| Self::parse(&v))
    }

    /// Returns true for identity encodings, which carry text verbatim.
    #[must_use]
    pub const fn is_identity(self) -> bool {
        matches!(self, Self::SevenBit | Self::EightBit | Self::Binary)
    }
}

/// Decodes a message body to text.
///
/// `headers` is the message header block the body belongs to. The rules are
/// applied in order:
///
/// 1. A top-level `base64` encoding decodes the whole body.
/// 2. Otherwise every base64 part announced inside the body is decoded and
///    the parts are joined with newlines.
/// 3. An identity encoding (`7bit`, `8bit`, `binary`) with no
///    quoted-printable part inside returns the body unchanged, so literal
///    `=XX` sequences in query strings survive.
/// 4. Anything else is decoded as Quoted-Printable.
///
/// Failures are logged and degrade to the best partial result; this never
/// fails.
#[must_use]
pub fn decode_body(raw: &str, headers: &str) -> String {
    let encoding = TransferEncoding::from_headers(&Headers::parse(headers));

    if encoding == TransferEncoding::Base64 {
        return match decode_base64(raw) {
            Ok(bytes) => bytes_to_text(bytes),
            Err(e) => {
                tracing::warn!(?e, "base64 body decode failed, keeping raw body");
                raw.to_string()
            }
        };
    }

    if let Some(text) = decode_base64_parts(raw) {
        return text;
    }

    if encoding.is_identity() && !declares_quoted_printable(raw) {
        return raw.to_string();
    }

    let decoded = decode_quoted_printable_lenient(raw);
    if decoded.invalid_escapes > 0 {
        tracing::warn!(
            invalid_escapes = decoded.invalid_escapes,
            "quoted-printable body had invalid escapes, kept verbatim"
        );
    }
    bytes_to_text(decoded.bytes)
}

/// Decodes all base64 part payloads, or `None` when the body has none.
fn decode_base64_parts(raw: &str) -> Option<String> {
    let re = BASE64_PART.as_ref()?;
    let mut parts = Vec::new();

    for caps in re.captures_iter(raw) {
        let Some(block) = caps.get(1) else { continue };
        match decode_base64(block.as_str()) {
            Ok(bytes) => parts.push(bytes_to_text(bytes)),
            Err(e) => tracing::warn!(?e, "base64 part decode failed, skipping part"),
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

fn declares_quoted_printable(raw: &str) -> bool {
    QP_PART.as_ref().is_some_and(|re| re.is_match(raw))
}

fn bytes_to_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| {
        tracing::warn!(error = %e.utf8_error(), "decoded body is not UTF-8, decoding lossily");
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    })
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
    use crate::encoding::encode_base64;

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("BASE64"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse(" quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("x-uuencode"), TransferEncoding::Unspecified);
        assert!(TransferEncoding::SevenBit.is_identity());
        assert!(!TransferEncoding::Base64.is_identity());
    }

    #[test]
    fn test_top_level_base64() {
        let body = format!("{}\r\n", encode_base64(b"Visit https://example.com/a"));
        let text = decode_body(&body, "Content-Transfer-Encoding: base64\r\n");
        assert_eq!(text, "Visit https://example.com/a");
    }

    #[test]
    fn test_multipart_base64_part() {
        let payload = encode_base64(b"Click https://www.netflix.com/account/update-primary-location?nftoken=x");
        let body = format!(
            "--b1\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: base64\r\n\r\n{payload}\r\n--b1--\r\n"
        );
        let text = decode_body(&body, "Content-Type: multipart/alternative; boundary=b1\r\n");
        assert!(text.contains("update-primary-location?nftoken=x"));
    }

    #[test]
    fn test_part_headers_after_encoding_header() {
        let payload = encode_base64(b"hello");
        let body = format!(
            "--b\r\nContent-Transfer-Encoding: base64\r\nContent-Type: text/plain\r\n\r\n{payload}\r\n--b--\r\n"
        );
        assert_eq!(decode_body(&body, ""), "hello");
    }

    #[test]
    fn test_quoted_printable_default() {
        let body = "https://www.netflix.com/account/update-primary-location?token=3Dabc=\r\n&x=3D1";
        let text = decode_body(body, "Content-Transfer-Encoding: quoted-printable\r\n");
        assert_eq!(
            text,
            "https://www.netflix.com/account/update-primary-location?token=abc&x=1"
        );
    }

    #[test]
    fn test_seven_bit_passthrough() {
        let body = "https://example.com/?a=bc&d=ef";
        assert_eq!(decode_body(body, "Content-Transfer-Encoding: 7bit\r\n"), body);
    }

    #[test]
    fn test_seven_bit_multipart_with_qp_part_decodes() {
        let body = "--b\r\nContent-Transfer-Encoding: quoted-printable\r\n\r\na=3Db\r\n--b--";
        let text = decode_body(body, "Content-Transfer-Encoding: 7bit\r\n");
        assert!(text.contains("a=b"));
    }

    #[test]
    fn test_bad_base64_keeps_raw() {
        let body = "!!not base64!!";
        assert_eq!(decode_body(body, "Content-Transfer-Encoding: base64\r\n"), body);
    }

    #[test]
    fn test_non_utf8_is_lossy() {
        let text = decode_body("caf=E9", "");
        assert_eq!(text, "caf\u{FFFD}");
    }
}

//! RFC 2047 encoded words in header text.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::encoding::{decode_base64, decode_q, encode_base64, encode_q};
use crate::error::Result;

static ENCODED_WORD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"=\?([^?\s]+)\?([BbQq])\?([^?\s]*)\?=").ok());

/// The encoding flag of an encoded word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordEncoding {
    /// `B`: Base64.
    Base64,
    /// `Q`: Quoted-Printable variant with `_` for space.
    Q,
}

/// Decodes every encoded word (`=?charset?B|Q?text?=`) in a header value.
///
/// Linear whitespace between two adjacent encoded words is dropped, as
/// RFC 2047 section 6.2 requires. A word that fails to decode is logged and
/// left verbatim; text that contains no encoded words is returned unchanged.
#[must_use]
pub fn decode_header_word(raw: &str) -> String {
    let Some(re) = ENCODED_WORD.as_ref() else {
        return raw.to_string();
    };

    let mut out = String::with_capacity(raw.len());
    let mut last_end = 0;
    let mut previous_decoded = false;

    for caps in re.captures_iter(raw) {
        let Some(whole) = caps.get(0) else { continue };
        let gap = &raw[last_end..whole.start()];
        if !(previous_decoded && gap.chars().all(char::is_whitespace)) {
            out.push_str(gap);
        }

        match decode_word(&caps) {
            Ok(text) => {
                out.push_str(&text);
                previous_decoded = true;
            }
            Err(e) => {
                tracing::warn!(?e, word = whole.as_str(), "failed to decode encoded word");
                out.push_str(whole.as_str());
                previous_decoded = false;
            }
        }
        last_end = whole.end();
    }

    out.push_str(&raw[last_end..]);
    out
}

/// Encodes text as a single UTF-8 encoded word.
#[must_use]
pub fn encode_header_word(text: &str, encoding: WordEncoding) -> String {
    match encoding {
        WordEncoding::Base64 => format!("=?utf-8?B?{}?=", encode_base64(text.as_bytes())),
        WordEncoding::Q => format!("=?utf-8?Q?{}?=", encode_q(text.as_bytes())),
    }
}

fn decode_word(caps: &Captures<'_>) -> Result<String> {
    let charset = &caps[1];
    let payload = &caps[3];
    let bytes = if caps[2].eq_ignore_ascii_case("B") {
        decode_base64(payload)?
    } else {
        decode_q(payload)?
    };
    Ok(decode_charset(charset, &bytes).into_owned())
}

/// Converts bytes in the declared charset to UTF-8.
///
/// RFC 2231 language suffixes (`utf-8*en`) are ignored. Unknown labels fall
/// back to lossy UTF-8.
pub(crate) fn decode_charset<'a>(charset: &str, bytes: &'a [u8]) -> Cow<'a, str> {
    let label = charset.split('*').next().unwrap_or(charset);
    match encoding_rs::Encoding::for_label(label.trim().as_bytes()) {
        Some(encoding) => {
            let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
            if had_errors {
                tracing::warn!(charset = label, "malformed bytes in encoded word");
            }
            text
        }
        None => String::from_utf8_lossy(bytes),
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
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(decode_header_word("Your Household"), "Your Household");
        assert_eq!(decode_header_word(""), "");
    }

    #[test]
    fn test_base64_word() {
        assert_eq!(
            decode_header_word("=?UTF-8?B?WW91ciBIb3VzZWhvbGQ=?="),
            "Your Household"
        );
    }

    #[test]
    fn test_q_word() {
        assert_eq!(
            decode_header_word("=?utf-8?Q?Mise_=C3=A0_jour?="),
            "Mise à jour"
        );
    }

    #[test]
    fn test_adjacent_words_join() {
        let raw = "=?utf-8?Q?Your_?= =?utf-8?B?SG91c2Vob2xk?=";
        assert_eq!(decode_header_word(raw), "Your Household");
    }

    #[test]
    fn test_surrounding_text_kept() {
        let raw = "Re: =?utf-8?Q?caf=C3=A9?= today";
        assert_eq!(decode_header_word(raw), "Re: café today");
    }

    #[test]
    fn test_declared_charset_honoured() {
        assert_eq!(decode_header_word("=?iso-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_unknown_scheme_unchanged() {
        let raw = "=?utf-8?X?abc?=";
        assert_eq!(decode_header_word(raw), raw);
    }

    #[test]
    fn test_malformed_word_unchanged() {
        let raw = "=?utf-8?Q?bad=Z?=";
        assert_eq!(decode_header_word(raw), raw);
    }

    proptest! {
        #[test]
        fn prop_base64_word_roundtrip(text in "\\PC{0,40}") {
            let encoded = encode_header_word(&text, WordEncoding::Base64);
            prop_assert_eq!(decode_header_word(&encoded), text);
        }

        #[test]
        fn prop_q_word_roundtrip(text in "\\PC{0,40}") {
            let encoded = encode_header_word(&text, WordEncoding::Q);
            prop_assert_eq!(decode_header_word(&encoded), text);
        }
    }
}

//! Header block parsing.

use std::collections::HashMap;

use crate::word::decode_header_word;

/// Parsed header block of a message or MIME part.
///
/// Names are case-insensitive; repeated headers keep every value in order.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: HashMap<String, Vec<String>>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_ascii_lowercase();
        self.headers.entry(name).or_default().push(value.into());
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Gets the first value for a header with encoded words decoded.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_header_word)
    }

    /// Returns the lowercased `Content-Transfer-Encoding` value, if any.
    #[must_use]
    pub fn transfer_encoding(&self) -> Option<String> {
        self.get("content-transfer-encoding")
            .map(|v| v.trim().to_ascii_lowercase())
    }

    /// Parses headers from raw text, unfolding continuation lines.
    ///
    /// Parsing stops at the first empty line. Lines without a colon are
    /// skipped rather than rejected.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, value);
            }
            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_string(), value.trim().to_string()));
            }
        }

        if let Some((name, value)) = current {
            headers.add(name, value);
        }

        headers
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
    fn test_parse_basic() {
        let headers = Headers::parse(
            "From: Netflix <info@netflix.com>\r\nSubject: Hello\r\n\r\nbody: not a header\r\n",
        );
        assert_eq!(headers.get("from"), Some("Netflix <info@netflix.com>"));
        assert_eq!(headers.get("SUBJECT"), Some("Hello"));
        assert_eq!(headers.get("body"), None);
    }

    #[test]
    fn test_folded_subject() {
        let headers = Headers::parse("Subject: Your Household\r\n Has Been\r\n\tUpdated\r\n");
        assert_eq!(
            headers.get("subject"),
            Some("Your Household Has Been Updated")
        );
    }

    #[test]
    fn test_folded_encoded_words_decode() {
        let headers =
            Headers::parse("Subject: =?utf-8?Q?Your_Household?=\r\n =?utf-8?Q?_Update?=\r\n");
        assert_eq!(
            headers.get_decoded("subject").as_deref(),
            Some("Your Household Update")
        );
    }

    #[test]
    fn test_transfer_encoding_normalised() {
        let headers = Headers::parse("Content-Transfer-Encoding:  Base64 \r\n");
        assert_eq!(headers.transfer_encoding().as_deref(), Some("base64"));
    }

    #[test]
    fn test_repeated_headers_keep_first() {
        let headers = Headers::parse("Received: a\r\nReceived: b\r\n");
        assert_eq!(headers.get("received"), Some("a"));
    }
}

//! Link extraction from decoded text.

use std::sync::LazyLock;

use regex::Regex;

/// `http`/`https` URL, terminated by whitespace, angle brackets, quotes,
/// a closing square bracket or a closing parenthesis.
static LINK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)https?://[^\s<>"'\])]+"#).ok());

/// Returns every link in `text` in order of appearance, duplicates included.
#[must_use]
pub fn extract_links(text: &str) -> Vec<String> {
    LINK.as_ref().map_or_else(Vec::new, |re| {
        re.find_iter(text).map(|m| m.as_str().to_string()).collect()
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

    #[test]
    fn test_order_and_duplicates() {
        let text = "a https://x.test/1 b http://y.test/2 c https://x.test/1";
        assert_eq!(
            extract_links(text),
            vec!["https://x.test/1", "http://y.test/2", "https://x.test/1"]
        );
    }

    #[test]
    fn test_terminators() {
        let text = r#"<a href="https://x.test/a?b=1">(https://x.test/p) [https://x.test/q] 'https://x.test/r'"#;
        assert_eq!(
            extract_links(text),
            vec![
                "https://x.test/a?b=1",
                "https://x.test/p",
                "https://x.test/q",
                "https://x.test/r"
            ]
        );
    }

    #[test]
    fn test_case_insensitive_scheme() {
        assert_eq!(extract_links("HTTPS://X.TEST/A"), vec!["HTTPS://X.TEST/A"]);
    }

    #[test]
    fn test_no_links() {
        assert!(extract_links("ftp://x.test nothing here").is_empty());
    }
}

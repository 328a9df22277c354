//! Sender and subject filtering.
//!
//! The server-side search narrows candidates to unseen mail from the target
//! senders; the local predicates then confirm both dimensions on the decoded
//! message before anything is marked seen.

use inboxhook_imap::SearchCriteria;

use crate::message::DecodedEmail;

/// Target senders and subjects, loaded once at startup.
///
/// Stored lower-cased; never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFilter {
    subjects: Vec<String>,
    addresses: Vec<String>,
}

impl TargetFilter {
    /// Creates a filter. Entries are trimmed and lower-cased; blank entries
    /// are dropped.
    #[must_use]
    pub fn new<S, A>(subjects: S, addresses: A) -> Self
    where
        S: IntoIterator,
        S::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        Self {
            subjects: normalize(subjects),
            addresses: normalize(addresses),
        }
    }

    /// Target subject substrings, lower-cased.
    #[must_use]
    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    /// Target sender addresses, lower-cased.
    #[must_use]
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Server-side query for this filter's senders.
    #[must_use]
    pub fn search_query(&self) -> SearchCriteria {
        build_search_query(&self.addresses)
    }

    /// Returns true when both the sender and the subject match.
    #[must_use]
    pub fn matches(&self, email: &DecodedEmail) -> bool {
        sender_matches(&email.from, &self.addresses) && subject_matches(&email.subject, &self.subjects)
    }
}

fn normalize<I>(items: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Builds `UNSEEN` AND (`FROM a` OR `FROM b` ...).
///
/// Several addresses are joined with binary OR, chained left to right. With
/// no addresses the query is bare `UNSEEN`; callers must supply at least one
/// address to actually filter by sender.
#[must_use]
pub fn build_search_query<S: AsRef<str>>(addresses: &[S]) -> SearchCriteria {
    let senders = addresses
        .iter()
        .map(|a| SearchCriteria::From(a.as_ref().to_string()))
        .reduce(SearchCriteria::or);

    match senders {
        Some(senders) => SearchCriteria::And(vec![SearchCriteria::Unseen, senders]),
        None => SearchCriteria::Unseen,
    }
}

/// Case-insensitive bidirectional substring match.
///
/// Matches when the candidate contains a target or a target contains the
/// candidate, which tolerates truncated and extended subject lines. An empty
/// candidate never matches.
#[must_use]
pub fn subject_matches<S: AsRef<str>>(candidate: &str, targets: &[S]) -> bool {
    let candidate = candidate.trim().to_lowercase();
    if candidate.is_empty() {
        return false;
    }
    targets.iter().any(|target| {
        let target = target.as_ref().trim().to_lowercase();
        !target.is_empty() && (candidate.contains(&target) || target.contains(&candidate))
    })
}

/// Returns true if the decoded `From` value contains any target address,
/// case-insensitively.
#[must_use]
pub fn sender_matches<S: AsRef<str>>(from: &str, addresses: &[S]) -> bool {
    let from = from.to_lowercase();
    addresses.iter().any(|address| {
        let address = address.as_ref().trim().to_lowercase();
        !address.is_empty() && from.contains(&address)
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

    fn from(a: &str) -> SearchCriteria {
        SearchCriteria::From(a.to_string())
    }

    #[test]
    fn test_query_single_address() {
        assert_eq!(
            build_search_query(&["a@x.com"]),
            SearchCriteria::And(vec![SearchCriteria::Unseen, from("a@x.com")])
        );
    }

    #[test]
    fn test_query_two_addresses() {
        assert_eq!(
            build_search_query(&["a@x.com", "b@x.com"]),
            SearchCriteria::And(vec![
                SearchCriteria::Unseen,
                SearchCriteria::Or(Box::new(from("a@x.com")), Box::new(from("b@x.com"))),
            ])
        );
    }

    #[test]
    fn test_query_chains_left_to_right() {
        let query = build_search_query(&["a", "b", "c"]);
        let expected_senders = SearchCriteria::Or(
            Box::new(SearchCriteria::Or(Box::new(from("a")), Box::new(from("b")))),
            Box::new(from("c")),
        );
        assert_eq!(
            query,
            SearchCriteria::And(vec![SearchCriteria::Unseen, expected_senders])
        );
    }

    #[test]
    fn test_query_no_addresses_is_unseen() {
        let none: [&str; 0] = [];
        assert_eq!(build_search_query(&none), SearchCriteria::Unseen);
    }

    #[test]
    fn test_subject_candidate_contains_target() {
        assert!(subject_matches("Netflix Household", &["Netflix"]));
        assert!(subject_matches("Your Household Has Been Updated", &["household"]));
    }

    #[test]
    fn test_subject_target_contains_candidate() {
        assert!(subject_matches("Household Update", &["Netflix Household Update"]));
    }

    #[test]
    fn test_subject_no_match() {
        assert!(!subject_matches("Weekly newsletter", &["household", "sign-in code"]));
    }

    #[test]
    fn test_empty_subject_never_matches() {
        assert!(!subject_matches("", &["household"]));
        assert!(!subject_matches("   ", &["household"]));
    }

    #[test]
    fn test_blank_target_ignored() {
        assert!(!subject_matches("anything", &[""]));
    }

    #[test]
    fn test_sender_matches_display_name_form() {
        let addresses = ["info@account.netflix.com"];
        assert!(sender_matches(
            "Netflix <INFO@account.netflix.com>",
            &addresses
        ));
        assert!(!sender_matches("Other <info@example.com>", &addresses));
    }

    #[test]
    fn test_target_filter_normalizes() {
        let filter = TargetFilter::new([" Household ", ""], ["Info@Netflix.com"]);
        assert_eq!(filter.subjects(), ["household"]);
        assert_eq!(filter.addresses(), ["info@netflix.com"]);
    }

    #[test]
    fn test_target_filter_requires_both() {
        let filter = TargetFilter::new(["household"], ["info@netflix.com"]);
        let mut email = DecodedEmail {
            subject: "Your Household Has Been Updated".to_string(),
            from: "Netflix <info@netflix.com>".to_string(),
            body: String::new(),
            links: Vec::new(),
        };
        assert!(filter.matches(&email));

        email.subject = "Your monthly receipt".to_string();
        assert!(!filter.matches(&email));

        email.subject = "Household".to_string();
        email.from = "someone@else.com".to_string();
        assert!(!filter.matches(&email));
    }
}

//! Command serialization helpers.

use super::types::{FetchAttribute, SearchCriteria, StoreAction};

/// Writes an astring: a bare atom when safe, otherwise a quoted string.
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b >= 0x7F
}

/// Writes a parenthesized FETCH item list.
pub fn write_fetch_items(buf: &mut Vec<u8>, items: &[FetchAttribute]) {
    buf.push(b'(');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            buf.push(b' ');
        }
        match item {
            FetchAttribute::Uid => buf.extend_from_slice(b"UID"),
            FetchAttribute::Flags => buf.extend_from_slice(b"FLAGS"),
            FetchAttribute::Rfc822Size => buf.extend_from_slice(b"RFC822.SIZE"),
            FetchAttribute::Body { section, peek } => {
                let open: &[u8] = if *peek { b"BODY.PEEK[" } else { b"BODY[" };
                buf.extend_from_slice(open);
                if let Some(section) = section {
                    buf.extend_from_slice(section.as_bytes());
                }
                buf.push(b']');
            }
        }
    }
    buf.push(b')');
}

/// Writes a STORE action with `.SILENT` when requested.
pub fn write_store_action(buf: &mut Vec<u8>, action: &StoreAction, silent: bool) {
    let (prefix, flags) = match action {
        StoreAction::AddFlags(flags) => ("+FLAGS", flags),
        StoreAction::RemoveFlags(flags) => ("-FLAGS", flags),
    };
    buf.extend_from_slice(prefix.as_bytes());
    if silent {
        buf.extend_from_slice(b".SILENT");
    }
    buf.extend_from_slice(b" (");
    for (i, flag) in flags.iter().enumerate() {
        if i > 0 {
            buf.push(b' ');
        }
        buf.extend_from_slice(flag.as_str().as_bytes());
    }
    buf.push(b')');
}

/// Writes SEARCH criteria in IMAP prefix form.
pub fn write_search_criteria(buf: &mut Vec<u8>, criteria: &SearchCriteria) {
    match criteria {
        SearchCriteria::All => buf.extend_from_slice(b"ALL"),
        SearchCriteria::Unseen => buf.extend_from_slice(b"UNSEEN"),
        SearchCriteria::Seen => buf.extend_from_slice(b"SEEN"),
        SearchCriteria::From(s) => {
            buf.extend_from_slice(b"FROM ");
            write_astring(buf, s);
        }
        SearchCriteria::Subject(s) => {
            buf.extend_from_slice(b"SUBJECT ");
            write_astring(buf, s);
        }
        SearchCriteria::Header(name, value) => {
            buf.extend_from_slice(b"HEADER ");
            write_astring(buf, name);
            buf.push(b' ');
            write_astring(buf, value);
        }
        SearchCriteria::And(criteria) => {
            for (i, c) in criteria.iter().enumerate() {
                if i > 0 {
                    buf.push(b' ');
                }
                write_search_criteria(buf, c);
            }
        }
        SearchCriteria::Or(a, b) => {
            buf.extend_from_slice(b"OR ");
            write_search_key(buf, a);
            buf.push(b' ');
            write_search_key(buf, b);
        }
        SearchCriteria::Not(c) => {
            buf.extend_from_slice(b"NOT ");
            write_search_key(buf, c);
        }
    }
}

/// Writes a single search key, parenthesizing a multi-key `And`.
fn write_search_key(buf: &mut Vec<u8>, criteria: &SearchCriteria) {
    if let SearchCriteria::And(list) = criteria
        && list.len() > 1
    {
        buf.push(b'(');
        write_search_criteria(buf, criteria);
        buf.push(b')');
    } else {
        write_search_criteria(buf, criteria);
    }
}

//! Tags, sequence numbers and UIDs.

use std::fmt;
use std::num::NonZeroU32;

/// IMAP command tag, echoed by the server on command completion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(pub String);

impl Tag {
    /// Creates a new tag from a string.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Message sequence number.
///
/// Ephemeral: sequence numbers shift when messages are expunged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(pub NonZeroU32);

impl SeqNum {
    /// Creates a sequence number, or `None` for 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message, stable within one UIDVALIDITY epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU32);

impl Uid {
    /// Creates a UID, or `None` for 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UIDVALIDITY value of a mailbox. A change invalidates every known UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UidValidity(pub NonZeroU32);

impl UidValidity {
    /// Creates a UIDVALIDITY, or `None` for 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

/// Set of UIDs for UID FETCH / UID STORE.
///
/// Serialized compactly: consecutive runs collapse to `a:b`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UidSet(Vec<Uid>);

impl UidSet {
    /// Creates a set holding one UID.
    #[must_use]
    pub fn single(uid: Uid) -> Self {
        Self(vec![uid])
    }

    /// Creates a set from UIDs in any order; duplicates are dropped.
    #[must_use]
    pub fn from_uids(uids: &[Uid]) -> Self {
        let mut sorted = uids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        Self(sorted)
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of UIDs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if `uid` is in the set.
    #[must_use]
    pub fn contains(&self, uid: Uid) -> bool {
        self.0.binary_search(&uid).is_ok()
    }

    /// Iterates UIDs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Uid> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for UidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.0.iter().map(|u| u.get()).peekable();
        let mut first = true;
        while let Some(start) = iter.next() {
            let mut end = start;
            while let Some(next) = iter.next_if(|&n| Some(n) == end.checked_add(1)) {
                end = next;
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}:{end}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn uids(values: &[u32]) -> Vec<Uid> {
        values.iter().map(|&v| Uid::new(v).unwrap()).collect()
    }

    #[test]
    fn test_zero_rejected() {
        assert!(Uid::new(0).is_none());
        assert!(SeqNum::new(0).is_none());
        assert!(UidValidity::new(0).is_none());
        assert_eq!(Uid::new(42).unwrap().get(), 42);
    }

    #[test]
    fn test_uid_set_single() {
        let set = UidSet::single(Uid::new(7).unwrap());
        assert_eq!(set.to_string(), "7");
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_uid_set_runs() {
        let set = UidSet::from_uids(&uids(&[9, 3, 4, 5, 12, 4, 10]));
        assert_eq!(set.to_string(), "3:5,9:10,12");
    }

    #[test]
    fn test_uid_set_empty() {
        let set = UidSet::from_uids(&[]);
        assert!(set.is_empty());
        assert_eq!(set.to_string(), "");
    }
}

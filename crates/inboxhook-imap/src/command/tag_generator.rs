//! Command tag generator.

/// Generates sequential command tags (`W0000`, `W0001`, ...).
///
/// Tags only need to be unique among commands in flight, so the counter
/// wraps instead of failing on overflow.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { counter: 0, prefix }
    }

    /// Generates the next tag.
    pub fn next(&mut self) -> String {
        let n = self.counter;
        self.counter = self.counter.wrapping_add(1);
        format!("{}{:04}", self.prefix, n)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('W')
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_tags() {
        let mut tags = TagGenerator::default();
        assert_eq!(tags.next(), "W0000");
        assert_eq!(tags.next(), "W0001");
    }

    #[test]
    fn test_counter_wraps() {
        let mut tags = TagGenerator::new('T');
        tags.counter = u32::MAX;
        assert_eq!(tags.next(), format!("T{}", u32::MAX));
        assert_eq!(tags.next(), "T0000");
    }
}

//! Host blacklist.
//!
//! Patterns are plain substrings: a host is blocked when any pattern occurs
//! anywhere in it. `amazon.com` blocks `shop.amazon.com` but not `amazon.org`.

use std::sync::Arc;

use parking_lot::RwLock;

/// Shared, wholesale-replaceable list of blocked host substrings.
///
/// Clones share the same list. Replacement swaps the whole list under the
/// write lock, so readers see either the old or the new list, never a mix.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    patterns: Arc<RwLock<Vec<String>>>,
}

impl Blacklist {
    /// Creates an empty blacklist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a blacklist from the given patterns.
    pub fn with_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = Self::new();
        list.replace(patterns.into_iter().map(Into::into).collect());
        list
    }

    /// Returns the first pattern contained in `host`, if any.
    pub fn matching_pattern(&self, host: &str) -> Option<String> {
        self.patterns
            .read()
            .iter()
            .find(|pattern| host.contains(pattern.as_str()))
            .cloned()
    }

    /// Returns true if `host` contains any pattern.
    pub fn is_blocked(&self, host: &str) -> bool {
        self.matching_pattern(host).is_some()
    }

    /// Returns a copy of the current patterns, in order.
    pub fn snapshot(&self) -> Vec<String> {
        self.patterns.read().clone()
    }

    /// Trims patterns and drops blank ones. An empty substring would match
    /// every host.
    pub fn normalize(patterns: Vec<String>) -> Vec<String> {
        patterns
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Replaces the whole list with the [normalized](Self::normalize) patterns.
    pub fn replace(&self, patterns: Vec<String>) {
        *self.patterns.write() = Self::normalize(patterns);
    }

    /// Number of patterns.
    pub fn len(&self) -> usize {
        self.patterns.read().len()
    }

    /// Returns true if nothing is blocked.
    pub fn is_empty(&self) -> bool {
        self.patterns.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_match() {
        let list = Blacklist::with_patterns(["amazon.com"]);
        assert!(list.is_blocked("shop.amazon.com"));
        assert!(list.is_blocked("amazon.com:443"));
        assert!(!list.is_blocked("amazon.org"));
    }

    #[test]
    fn test_substring_is_literal_not_domain_aware() {
        let list = Blacklist::with_patterns(["amazon.com"]);
        assert!(list.is_blocked("notamazon.com.evil.net"));
    }

    #[test]
    fn test_empty_list_blocks_nothing() {
        let list = Blacklist::new();
        assert!(!list.is_blocked("example.com"));
        assert!(list.is_empty());
    }

    #[test]
    fn test_blank_patterns_dropped() {
        let list = Blacklist::with_patterns(["", "  ", " ads.example "]);
        assert_eq!(list.snapshot(), vec!["ads.example"]);
        assert!(!list.is_blocked("example.com"));
    }

    #[test]
    fn test_normalize_matches_replace() {
        let raw = vec![" ads.example ".to_string(), "".into(), "cdn.example".into()];
        let list = Blacklist::new();
        list.replace(raw.clone());

        assert_eq!(Blacklist::normalize(raw), list.snapshot());
        assert_eq!(list.snapshot(), vec!["ads.example", "cdn.example"]);
    }

    #[test]
    fn test_replace_is_shared_between_clones() {
        let list = Blacklist::with_patterns(["a.com"]);
        let handle = list.clone();

        handle.replace(vec!["b.com".into(), "c.com".into()]);

        assert!(!list.is_blocked("a.com"));
        assert!(list.is_blocked("www.b.com"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_matching_pattern_reports_first_match() {
        let list = Blacklist::with_patterns(["ads", "ads.example"]);
        assert_eq!(
            list.matching_pattern("ads.example.com"),
            Some("ads".to_string())
        );
    }
}

use rustc_hash::FxHashSet;

/// Glob patterns already handed to a watch backend.
///
/// Registering the same pattern twice would double every event the backend
/// reports, so callers funnel new patterns through [`Self::insert_new`].
#[derive(Clone, Debug, Default)]
pub struct WatchEntrySet {
    entries: FxHashSet<String>,
}

impl WatchEntrySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `patterns` and return only the ones not seen before, in the
    /// order given.
    pub fn insert_new<I, S>(&mut self, patterns: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        patterns
            .into_iter()
            .map(Into::into)
            .filter(|pattern| self.entries.insert(pattern.clone()))
            .collect()
    }

    #[must_use]
    pub fn contains(&self, pattern: &str) -> bool {
        self.entries.contains(pattern)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_pattern_registers_once() {
        let mut set = WatchEntrySet::new();
        assert_eq!(set.insert_new(["**/*.css"]), ["**/*.css"]);
        assert!(set.insert_new(["**/*.css"]).is_empty());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_keeps_order_of_new_patterns() {
        let mut set = WatchEntrySet::new();
        set.insert_new(["/ws/src/**"]);

        let added = set.insert_new(["/ws/lib/**", "/ws/src/**", "/ws/app/**", "/ws/lib/**"]);
        assert_eq!(added, ["/ws/lib/**", "/ws/app/**"]);
    }

    #[test]
    fn test_clear_allows_reregistration() {
        let mut set = WatchEntrySet::new();
        set.insert_new(["**/package-lock.json"]);
        set.clear();

        assert!(set.is_empty());
        assert!(!set.contains("**/package-lock.json"));
        assert_eq!(set.insert_new(["**/package-lock.json"]).len(), 1);
    }
}

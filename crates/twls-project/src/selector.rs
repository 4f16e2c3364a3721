use std::fmt;

use camino::Utf8Path;
use globset::GlobBuilder;
use globset::GlobMatcher;

/// How authoritative a selector is when several projects claim a document.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SelectorPriority {
    UserConfigured,
    ContentFile,
    CssFile,
    ConfigFile,
    CssDirectory,
    ConfigDirectory,
    PackageDirectory,
    RootDirectory,
}

/// Most to least authoritative. A selector's rank is its index here.
pub const PRIORITY_ORDER: [SelectorPriority; 8] = [
    SelectorPriority::UserConfigured,
    SelectorPriority::ContentFile,
    SelectorPriority::CssFile,
    SelectorPriority::ConfigFile,
    SelectorPriority::CssDirectory,
    SelectorPriority::ConfigDirectory,
    SelectorPriority::PackageDirectory,
    SelectorPriority::RootDirectory,
];

impl SelectorPriority {
    /// Lower wins.
    #[must_use]
    pub fn rank(self) -> usize {
        PRIORITY_ORDER
            .iter()
            .position(|p| *p == self)
            .unwrap_or(PRIORITY_ORDER.len())
    }
}

impl fmt::Display for SelectorPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UserConfigured => "user-configured",
            Self::ContentFile => "content-file",
            Self::CssFile => "css-file",
            Self::ConfigFile => "config-file",
            Self::CssDirectory => "css-directory",
            Self::ConfigDirectory => "config-directory",
            Self::PackageDirectory => "package-directory",
            Self::RootDirectory => "root-directory",
        };
        f.write_str(name)
    }
}

/// A glob pattern paired with its priority.
///
/// A leading `!` negates the pattern: a match vetoes the owning project.
/// Patterns that fail to compile never match.
#[derive(Clone, Debug)]
pub struct Selector {
    pattern: String,
    priority: SelectorPriority,
    matcher: Option<GlobMatcher>,
}

impl Selector {
    #[must_use]
    pub fn new(pattern: impl Into<String>, priority: SelectorPriority) -> Self {
        let pattern = pattern.into();
        let body = pattern.strip_prefix('!').unwrap_or(&pattern);
        let matcher = match GlobBuilder::new(body).literal_separator(true).build() {
            Ok(glob) => Some(glob.compile_matcher()),
            Err(err) => {
                tracing::debug!(pattern = %pattern, error = %err, "selector pattern does not compile");
                None
            }
        };

        Self {
            pattern,
            priority,
            matcher,
        }
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn priority(&self) -> SelectorPriority {
        self.priority
    }

    #[must_use]
    pub fn is_negated(&self) -> bool {
        self.pattern.starts_with('!')
    }

    /// Whether the glob body (without any `!`) matches `path`.
    #[must_use]
    pub fn matches(&self, path: &Utf8Path) -> bool {
        self.matcher
            .as_ref()
            .is_some_and(|matcher| matcher.is_match(path.as_str()))
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.priority == other.priority
    }
}

impl Eq for Selector {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_follows_priority_order() {
        for (index, priority) in PRIORITY_ORDER.iter().enumerate() {
            assert_eq!(priority.rank(), index);
        }
        assert!(SelectorPriority::UserConfigured.rank() < SelectorPriority::RootDirectory.rank());
        assert!(SelectorPriority::ContentFile.rank() < SelectorPriority::CssFile.rank());
    }

    #[test]
    fn test_negated_selector_matches_its_body() {
        let selector = Selector::new("!/ws/legacy/**", SelectorPriority::ContentFile);
        assert!(selector.is_negated());
        assert!(selector.matches(Utf8Path::new("/ws/legacy/index.html")));
        assert!(!selector.matches(Utf8Path::new("/ws/src/index.html")));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let selector = Selector::new("/ws/*.html", SelectorPriority::ContentFile);
        assert!(selector.matches(Utf8Path::new("/ws/index.html")));
        assert!(!selector.matches(Utf8Path::new("/ws/src/index.html")));
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        let selector = Selector::new("/ws/[", SelectorPriority::ContentFile);
        assert!(!selector.matches(Utf8Path::new("/ws/[")));
    }

    #[test]
    fn test_escaped_brackets_match_literally() {
        let selector = Selector::new("/ws/[[]slug[]]/**", SelectorPriority::CssDirectory);
        assert!(selector.matches(Utf8Path::new("/ws/[slug]/page.html")));
    }
}

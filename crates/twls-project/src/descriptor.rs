use std::fmt;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use rustc_hash::FxHashSet;
use semver::Version;

use crate::selector::Selector;
use crate::selector::SelectorPriority;

/// Registry-assigned project identity. Never reused within a process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(u32);

impl ProjectId {
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything discovery learned about one project.
///
/// Selectors are kept deduplicated by pattern text and sorted by rank; use
/// [`Self::add_selectors`] rather than pushing to them directly.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectDescriptor {
    config_path: Option<Utf8PathBuf>,
    user_configured: bool,
    selectors: Vec<Selector>,
    version: Version,
}

impl ProjectDescriptor {
    #[must_use]
    pub fn new(config_path: impl Into<Utf8PathBuf>, version: Version) -> Self {
        Self {
            config_path: Some(config_path.into()),
            user_configured: false,
            selectors: Vec::new(),
            version,
        }
    }

    /// A descriptor with no config path. It only receives documents that no
    /// other project claims.
    #[must_use]
    pub fn fallback(version: Version) -> Self {
        Self {
            config_path: None,
            user_configured: false,
            selectors: Vec::new(),
            version,
        }
    }

    #[must_use]
    pub fn user_configured(mut self) -> Self {
        self.user_configured = true;
        self
    }

    #[must_use]
    pub fn with_selectors(mut self, selectors: impl IntoIterator<Item = Selector>) -> Self {
        self.add_selectors(selectors);
        self
    }

    pub fn add_selectors(&mut self, selectors: impl IntoIterator<Item = Selector>) {
        self.selectors.extend(selectors);
        self.normalize();
    }

    pub fn add_selector(&mut self, pattern: impl Into<String>, priority: SelectorPriority) {
        self.add_selectors([Selector::new(pattern, priority)]);
    }

    /// Stable sort by rank, then keep only the first selector per pattern.
    fn normalize(&mut self) {
        self.selectors.sort_by_key(|s| s.priority().rank());
        let mut seen = FxHashSet::default();
        self.selectors
            .retain(|selector| seen.insert(selector.pattern().to_string()));
    }

    #[must_use]
    pub fn config_path(&self) -> Option<&Utf8Path> {
        self.config_path.as_deref()
    }

    #[must_use]
    pub fn is_user_configured(&self) -> bool {
        self.user_configured
    }

    #[must_use]
    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }
}

use camino::Utf8Path;
use camino::Utf8PathBuf;
use globset::GlobBuilder;
use globset::GlobSet;
use globset::GlobSetBuilder;

use crate::paths::normalize_path;

/// Compiled `files.exclude` patterns.
///
/// Patterns are matched against absolute, normalized paths. Invalid globs are
/// logged and dropped rather than failing the whole set.
#[derive(Clone, Debug)]
pub struct ExcludeSet {
    patterns: Vec<String>,
    set: GlobSet,
}

impl ExcludeSet {
    #[must_use]
    pub fn new(patterns: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            match GlobBuilder::new(pattern).literal_separator(true).build() {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(err) => {
                    tracing::warn!(pattern = %pattern, error = %err, "ignoring invalid exclude pattern");
                }
            }
        }

        let set = builder.build().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to compile exclude patterns");
            GlobSet::empty()
        });

        Self {
            patterns: patterns.to_vec(),
            set,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(&[])
    }

    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    #[must_use]
    pub fn is_excluded(&self, path: &Utf8Path) -> bool {
        self.set.is_match(path.as_str())
    }

    /// Directory variant of [`Self::is_excluded`]: `**/node_modules/**` must
    /// prune `node_modules` itself, not just the files below it.
    #[must_use]
    pub fn is_excluded_dir(&self, dir: &Utf8Path) -> bool {
        self.set.is_match(dir.as_str()) || self.set.is_match(format!("{dir}/"))
    }

    /// Directories the native backend should never report events from.
    ///
    /// Each pattern loses its leading and trailing `*` and `/` characters and
    /// the remainder is resolved against `root`, so `**/node_modules/**`
    /// becomes `<root>/node_modules`.
    #[must_use]
    pub fn ignore_dirs(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        let mut dirs: Vec<Utf8PathBuf> = self
            .patterns
            .iter()
            .map(|pattern| pattern.trim_matches(|c| c == '*' || c == '/'))
            .filter(|stripped| !stripped.is_empty())
            .map(|stripped| normalize_path(&root.join(stripped)))
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs
    }
}

impl Default for ExcludeSet {
    fn default() -> Self {
        Self::empty()
    }
}

//! File classes that matter to project topology.

use std::sync::LazyLock;

use camino::Utf8Path;
use globset::Glob;
use globset::GlobMatcher;

pub const CONFIG_GLOB: &str =
    "{tailwind,tailwind.config,tailwind.*.config,tailwind.config.*}.{js,cjs,mjs,ts,cts,mts}";
pub const CSS_GLOB: &str = "*.{css,scss,sass,less,pcss}";
pub const LOCK_GLOB: &str = "{package-lock.json,yarn.lock,pnpm-lock.yaml,bun.lockb}";

/// Patterns handed to a client that watches files on our behalf.
#[must_use]
pub fn client_watch_patterns() -> [String; 3] {
    [
        format!("**/{CONFIG_GLOB}"),
        format!("**/{LOCK_GLOB}"),
        format!("**/{CSS_GLOB}"),
    ]
}

fn file_name_matcher(glob: &str) -> Option<GlobMatcher> {
    Glob::new(glob)
        .inspect_err(|err| tracing::error!(glob, error = %err, "invalid file class glob"))
        .ok()
        .map(|glob| glob.compile_matcher())
}

static CONFIG: LazyLock<Option<GlobMatcher>> = LazyLock::new(|| file_name_matcher(CONFIG_GLOB));
static CSS: LazyLock<Option<GlobMatcher>> = LazyLock::new(|| file_name_matcher(CSS_GLOB));
static LOCK: LazyLock<Option<GlobMatcher>> = LazyLock::new(|| file_name_matcher(LOCK_GLOB));

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FileClass {
    /// `tailwind.config.js` and its variants
    Config,
    /// A stylesheet that may carry an `@config` directive
    Css,
    /// A package manager lock file
    Lock,
    Other,
}

impl FileClass {
    /// Classify by file name alone.
    #[must_use]
    pub fn of(path: &Utf8Path) -> Self {
        let Some(name) = path.file_name() else {
            return Self::Other;
        };
        let is = |matcher: &Option<GlobMatcher>| {
            matcher.as_ref().is_some_and(|m| m.is_match(name))
        };

        if is(&CONFIG) {
            Self::Config
        } else if is(&LOCK) {
            Self::Lock
        } else if is(&CSS) {
            Self::Css
        } else {
            Self::Other
        }
    }
}

/// Whether a config file needs TypeScript config support.
#[must_use]
pub fn is_typescript_config(path: &Utf8Path) -> bool {
    matches!(path.extension(), Some("ts" | "mts" | "cts"))
}

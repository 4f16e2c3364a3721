//! Framework version resolution and the feature gates that depend on it.

use camino::Utf8Path;
use semver::Version;
use serde::Deserialize;

/// Version assumed when no local `tailwindcss` package can be found.
pub const DEFAULT_VERSION: &str = "3.4.17";

#[must_use]
pub fn default_version() -> Version {
    Version::parse(DEFAULT_VERSION).unwrap_or_else(|_| Version::new(3, 4, 17))
}

/// Finds the `tailwindcss` version a config file binds to.
///
/// Implementations must be cheap to call repeatedly; the change classifier
/// re-resolves every live project whenever a lock file changes.
pub trait VersionResolver: Send + Sync {
    fn resolve(&self, from_dir: &Utf8Path) -> Option<Version>;
}

/// Node-style lookup: `node_modules/tailwindcss/package.json` in `from_dir`
/// or any ancestor.
#[derive(Clone, Copy, Debug, Default)]
pub struct NodeModulesResolver;

#[derive(Deserialize)]
struct PackageManifest {
    version: String,
}

impl VersionResolver for NodeModulesResolver {
    fn resolve(&self, from_dir: &Utf8Path) -> Option<Version> {
        from_dir.ancestors().find_map(|dir| {
            let manifest = dir.join("node_modules/tailwindcss/package.json");
            let contents = std::fs::read_to_string(&manifest).ok()?;
            let package: PackageManifest = serde_json::from_str(&contents)
                .inspect_err(|err| {
                    tracing::debug!(path = %manifest, error = %err, "unreadable tailwindcss manifest");
                })
                .ok()?;
            Version::parse(&package.version)
                .inspect_err(|err| {
                    tracing::debug!(path = %manifest, error = %err, "invalid tailwindcss version");
                })
                .ok()
        })
    }
}

/// A resolved version and whether it came from the bundled default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: Version,
    pub is_default: bool,
}

impl ResolvedVersion {
    #[must_use]
    pub fn supports(&self, feature: Feature) -> bool {
        feature.supported_by(&self.version)
    }
}

#[must_use]
pub fn resolve_version(resolver: &dyn VersionResolver, from_dir: &Utf8Path) -> ResolvedVersion {
    match resolver.resolve(from_dir) {
        Some(version) => ResolvedVersion {
            version,
            is_default: false,
        },
        None => ResolvedVersion {
            version: default_version(),
            is_default: true,
        },
    }
}

/// Capabilities that only exist from some framework version on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Feature {
    /// `@config "./tailwind.config.js"` inside a stylesheet
    CssConfigDirective,
    /// `content: { relative: true }`
    RelativeContent,
    /// `tailwind.config.ts` and friends
    TypeScriptConfig,
}

impl Feature {
    #[must_use]
    pub fn minimum_version(self) -> Version {
        match self {
            Self::CssConfigDirective | Self::RelativeContent => Version::new(3, 2, 0),
            Self::TypeScriptConfig => Version::new(3, 3, 0),
        }
    }

    #[must_use]
    pub fn supported_by(self, version: &Version) -> bool {
        // compare without pre-release so 3.3.0-insiders counts as 3.3.0
        let release = Version::new(version.major, version.minor, version.patch);
        release >= self.minimum_version()
    }
}

//! Project discovery: from a workspace root (and optionally an explicit
//! user map) to a set of project descriptors.

use std::sync::Arc;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use rustc_hash::FxHashMap;
use semver::Version;
use twls_conf::ConfigFileMap;
use twls_workspace::normalize_path;
use twls_workspace::paths::directory_glob;
use twls_workspace::paths::escape_glob;
use twls_workspace::paths::join_glob;
use twls_workspace::walk_files;
use twls_workspace::ExcludeSet;
use twls_workspace::WalkOptions;

use crate::content::ConfigContent;
use crate::content::ConfigLoader;
use crate::descriptor::ProjectDescriptor;
use crate::files::is_typescript_config;
use crate::files::FileClass;
use crate::selector::Selector;
use crate::selector::SelectorPriority;
use crate::stylesheet::resolve_config_directive;
use crate::version::resolve_version;
use crate::version::Feature;
use crate::version::ResolvedVersion;
use crate::version::VersionResolver;

/// Result of one discovery pass.
#[derive(Debug, Default)]
pub struct Discovered {
    pub projects: Vec<ProjectDescriptor>,
    /// Version resolved for each config path, for drift detection.
    pub versions: FxHashMap<Utf8PathBuf, Version>,
    /// Config path declared by each stylesheet with an `@config` directive.
    pub css_configs: FxHashMap<Utf8PathBuf, Utf8PathBuf>,
}

/// A file that causes a project to exist.
struct Trigger {
    path: Utf8PathBuf,
    config: Utf8PathBuf,
    is_css: bool,
}

/// Everything discovery needs; cheap to clone into a blocking task.
#[derive(Clone)]
pub struct Discovery {
    root: Utf8PathBuf,
    exclude: ExcludeSet,
    resolver: Arc<dyn VersionResolver>,
    loader: Arc<dyn ConfigLoader>,
}

impl Discovery {
    #[must_use]
    pub fn new(
        root: impl Into<Utf8PathBuf>,
        exclude: ExcludeSet,
        resolver: Arc<dyn VersionResolver>,
        loader: Arc<dyn ConfigLoader>,
    ) -> Self {
        Self {
            root: normalize_path(&root.into()),
            exclude,
            resolver,
            loader,
        }
    }

    /// Explicit mode when `explicit` is given, automatic otherwise.
    #[must_use]
    pub fn discover(&self, explicit: Option<&ConfigFileMap>) -> Discovered {
        match explicit {
            Some(map) => self.discover_explicit(map),
            None => self.discover_auto(),
        }
    }

    fn discover_explicit(&self, map: &ConfigFileMap) -> Discovered {
        let mut discovered = Discovered::default();

        for entry in map.entries() {
            let config = normalize_path(&self.root.join(&entry.config));
            let resolved = self.resolve(&config);

            let selectors = entry.selectors.iter().map(|pattern| {
                Selector::new(join_glob(&self.root, pattern), SelectorPriority::UserConfigured)
            });

            discovered.versions.insert(config.clone(), resolved.version.clone());
            discovered.projects.push(
                ProjectDescriptor::new(config, resolved.version)
                    .user_configured()
                    .with_selectors(selectors),
            );
        }

        tracing::info!(projects = discovered.projects.len(), "loaded user-configured projects");
        discovered
    }

    fn discover_auto(&self) -> Discovered {
        let mut discovered = Discovered::default();

        let options = WalkOptions {
            exclude: self.exclude.clone(),
            ..WalkOptions::default()
        };
        let files = walk_files(
            &self.root,
            |path| matches!(FileClass::of(path), FileClass::Config | FileClass::Css),
            &options,
        );

        let mut triggers = Vec::new();
        for path in files {
            match FileClass::of(&path) {
                FileClass::Config => triggers.push(Trigger {
                    config: path.clone(),
                    path,
                    is_css: false,
                }),
                FileClass::Css => {
                    let css = match std::fs::read_to_string(&path) {
                        Ok(css) => css,
                        Err(err) => {
                            tracing::debug!(path = %path, error = %err, "skipping unreadable stylesheet");
                            continue;
                        }
                    };
                    if let Some(config) = resolve_config_directive(&path, &css) {
                        discovered.css_configs.insert(path.clone(), config.clone());
                        triggers.push(Trigger {
                            path,
                            config,
                            is_css: true,
                        });
                    }
                }
                FileClass::Lock | FileClass::Other => {}
            }
        }

        let mut index: FxHashMap<Utf8PathBuf, usize> = FxHashMap::default();
        let mut resolved_versions: FxHashMap<Utf8PathBuf, ResolvedVersion> = FxHashMap::default();

        for trigger in triggers {
            let resolved = resolved_versions
                .entry(trigger.config.clone())
                .or_insert_with(|| self.resolve(&trigger.config))
                .clone();

            if !self.accepts(&trigger, &resolved) {
                continue;
            }

            let content = self.loader.load(&trigger.config).unwrap_or_else(|err| {
                tracing::debug!(config = %trigger.config, error = %err, "config content unavailable");
                ConfigContent::default()
            });

            let selectors = self.selectors_for(&trigger, &content, &resolved);
            discovered
                .versions
                .insert(trigger.config.clone(), resolved.version.clone());

            match index.get(&trigger.config) {
                Some(&i) => discovered.projects[i].add_selectors(selectors),
                None => {
                    index.insert(trigger.config.clone(), discovered.projects.len());
                    discovered.projects.push(
                        ProjectDescriptor::new(trigger.config, resolved.version)
                            .with_selectors(selectors),
                    );
                }
            }
        }

        if let [only] = discovered.projects.as_mut_slice() {
            only.add_selector(directory_glob(&self.root), SelectorPriority::RootDirectory);
        }

        tracing::info!(
            projects = discovered.projects.len(),
            root = %self.root,
            "discovered projects"
        );
        discovered
    }

    fn resolve(&self, config: &Utf8Path) -> ResolvedVersion {
        let dir = config.parent().unwrap_or(&self.root);
        resolve_version(self.resolver.as_ref(), dir)
    }

    fn accepts(&self, trigger: &Trigger, resolved: &ResolvedVersion) -> bool {
        if trigger.is_css {
            if resolved.is_default || !resolved.supports(Feature::CssConfigDirective) {
                tracing::debug!(
                    css = %trigger.path,
                    version = %resolved.version,
                    "ignoring @config: no local tailwindcss supporting it"
                );
                return false;
            }
            if !trigger.config.is_file() {
                tracing::debug!(css = %trigger.path, config = %trigger.config, "@config target missing");
                return false;
            }
        }

        if is_typescript_config(&trigger.config) && !resolved.supports(Feature::TypeScriptConfig) {
            tracing::debug!(
                config = %trigger.config,
                version = %resolved.version,
                "ignoring TypeScript config on tailwindcss without TypeScript support"
            );
            return false;
        }

        true
    }

    fn selectors_for(
        &self,
        trigger: &Trigger,
        content: &ConfigContent,
        resolved: &ResolvedVersion,
    ) -> Vec<Selector> {
        let config_dir = trigger.config.parent().unwrap_or(&self.root);
        let trigger_dir = trigger.path.parent().unwrap_or(&self.root);
        let package_root = self.package_root(config_dir);

        let content_base = if content.relative && resolved.supports(Feature::RelativeContent) {
            config_dir
        } else {
            package_root.as_path()
        };

        let mut selectors = Vec::new();

        if trigger.is_css {
            selectors.push(Selector::new(escape_glob(trigger.path.as_str()), SelectorPriority::CssFile));
        }
        selectors.push(Selector::new(escape_glob(trigger.config.as_str()), SelectorPriority::ConfigFile));

        selectors.extend(
            content
                .files
                .iter()
                .map(|file| Selector::new(join_glob(content_base, file), SelectorPriority::ContentFile)),
        );

        if trigger.is_css {
            selectors.push(Selector::new(directory_glob(trigger_dir), SelectorPriority::CssDirectory));
        }
        selectors.push(Selector::new(directory_glob(config_dir), SelectorPriority::ConfigDirectory));
        selectors.push(Selector::new(
            directory_glob(&package_root),
            SelectorPriority::PackageDirectory,
        ));

        selectors
    }

    /// Nearest directory at or above `dir` (within the workspace) holding a
    /// `package.json`, or the workspace root.
    fn package_root(&self, dir: &Utf8Path) -> Utf8PathBuf {
        dir.ancestors()
            .take_while(|ancestor| ancestor.starts_with(&self.root))
            .find(|ancestor| ancestor.join("package.json").is_file())
            .map_or_else(|| self.root.clone(), Utf8Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::content::StaticConfigLoader;

    /// Resolves every directory to the same version, or to nothing.
    struct FixedResolver(Option<Version>);

    impl VersionResolver for FixedResolver {
        fn resolve(&self, _from_dir: &Utf8Path) -> Option<Version> {
            self.0.clone()
        }
    }

    struct Workspace {
        _tmp: tempfile::TempDir,
        root: Utf8PathBuf,
    }

    impl Workspace {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
            let root = normalize_path(&root);
            Self { _tmp: tmp, root }
        }

        fn write(&self, rel: &str, contents: &str) -> Utf8PathBuf {
            let path = self.root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, contents).unwrap();
            path
        }

        fn discovery(&self, version: Option<Version>) -> Discovery {
            Discovery::new(
                self.root.clone(),
                ExcludeSet::new(&["**/node_modules/**".to_string()]),
                Arc::new(FixedResolver(version)),
                Arc::new(StaticConfigLoader),
            )
        }
    }

    fn patterns(descriptor: &ProjectDescriptor) -> Vec<(&str, SelectorPriority)> {
        descriptor
            .selectors()
            .iter()
            .map(|s| (s.pattern(), s.priority()))
            .collect()
    }

    mod auto {
        use super::*;

        #[test]
        fn test_single_config_gets_catch_all() {
            let ws = Workspace::new();
            ws.write("tailwind.config.js", "module.exports = { content: ['./src/**/*.html'] }");

            let discovered = ws.discovery(None).discover(None);
            assert_eq!(discovered.projects.len(), 1);

            let project = &discovered.projects[0];
            let last = project.selectors().last().unwrap();
            assert_eq!(last.priority(), SelectorPriority::RootDirectory);
            assert!(project
                .selectors()
                .iter()
                .any(|s| s.priority() == SelectorPriority::ContentFile
                    && s.pattern() == format!("{}/src/**/*.html", ws.root)));
            assert!(!project.is_user_configured());
        }

        #[test]
        fn test_two_configs_get_no_catch_all() {
            let ws = Workspace::new();
            ws.write("a/tailwind.config.js", "module.exports = { content: ['./src/**/*.html'] }");
            ws.write("b/tailwind.config.js", "module.exports = { content: ['./src/**/*.html'] }");

            let discovered = ws.discovery(None).discover(None);
            assert_eq!(discovered.projects.len(), 2);
            for project in &discovered.projects {
                assert!(project
                    .selectors()
                    .iter()
                    .all(|s| s.priority() != SelectorPriority::RootDirectory));
            }
        }

        #[test]
        fn test_content_resolves_against_package_root() {
            let ws = Workspace::new();
            ws.write("web/package.json", "{}");
            ws.write(
                "web/config/tailwind.config.js",
                "module.exports = { content: ['./src/**/*.html'] }",
            );

            let discovered = ws.discovery(None).discover(None);
            let project = &discovered.projects[0];
            let expected = format!("{}/web/src/**/*.html", ws.root);
            assert!(patterns(project).contains(&(expected.as_str(), SelectorPriority::ContentFile)));

            let package_dir = format!("{}/web/**", ws.root);
            assert!(patterns(project)
                .contains(&(package_dir.as_str(), SelectorPriority::PackageDirectory)));
        }

        #[test]
        fn test_relative_content_resolves_against_config_dir() {
            let ws = Workspace::new();
            ws.write("web/package.json", "{}");
            ws.write(
                "web/config/tailwind.config.js",
                "module.exports = { content: { relative: true, files: ['./src/**/*.html'] } }",
            );

            let discovered = ws.discovery(None).discover(None);
            let expected = format!("{}/web/config/src/**/*.html", ws.root);
            assert!(patterns(&discovered.projects[0])
                .contains(&(expected.as_str(), SelectorPriority::ContentFile)));
        }

        #[test]
        fn test_relative_content_ignored_on_old_versions() {
            let ws = Workspace::new();
            ws.write(
                "config/tailwind.config.js",
                "module.exports = { content: { relative: true, files: ['./src/**/*.html'] } }",
            );

            let discovered = ws.discovery(Some(Version::new(3, 1, 0))).discover(None);
            let expected = format!("{}/src/**/*.html", ws.root);
            assert!(patterns(&discovered.projects[0])
                .contains(&(expected.as_str(), SelectorPriority::ContentFile)));
        }

        #[test]
        fn test_stylesheet_directive_needs_local_install() {
            let ws = Workspace::new();
            ws.write("site/tailwind.site.js", "module.exports = { content: [] }");
            let css = ws.write("styles/site.css", "@config \"../site/tailwind.site.js\";");

            let fallback = ws.discovery(None).discover(None);
            assert!(fallback.projects.is_empty());
            // the directive is recorded even when its project is rejected
            assert!(fallback.css_configs.contains_key(&css));

            let local = ws.discovery(Some(Version::new(3, 4, 1))).discover(None);
            assert_eq!(local.projects.len(), 1);
            let project = &local.projects[0];
            assert_eq!(
                project.config_path(),
                Some(ws.root.join("site/tailwind.site.js").as_path())
            );
            let selectors = patterns(project);
            assert!(selectors.contains(&(css.as_str(), SelectorPriority::CssFile)));
            let css_dir = format!("{}/styles/**", ws.root);
            assert!(selectors.contains(&(css_dir.as_str(), SelectorPriority::CssDirectory)));
        }

        #[test]
        fn test_typescript_config_needs_newer_version() {
            let ws = Workspace::new();
            ws.write("tailwind.config.ts", "export default { content: [] }");

            assert!(ws
                .discovery(Some(Version::new(3, 2, 4)))
                .discover(None)
                .projects
                .is_empty());
            assert_eq!(
                ws.discovery(Some(Version::new(3, 3, 0))).discover(None).projects.len(),
                1
            );
        }

        #[test]
        fn test_triggers_for_same_config_accumulate() {
            let ws = Workspace::new();
            ws.write("tailwind.config.js", "module.exports = { content: [] }");
            ws.write("a/one.css", "@config \"../tailwind.config.js\";");
            ws.write("b/two.css", "@config \"../tailwind.config.js\";");

            let discovered = ws.discovery(Some(Version::new(3, 4, 0))).discover(None);
            assert_eq!(discovered.projects.len(), 1);
            let css_files = discovered.projects[0]
                .selectors()
                .iter()
                .filter(|s| s.priority() == SelectorPriority::CssFile)
                .count();
            assert_eq!(css_files, 2);
        }

        #[test]
        fn test_excluded_and_broken_files_are_skipped() {
            let ws = Workspace::new();
            ws.write("node_modules/pkg/tailwind.config.js", "module.exports = {}");
            ws.write("tailwind.config.js", "module.exports = { content: ['./src");

            let discovered = ws.discovery(None).discover(None);
            assert_eq!(discovered.projects.len(), 1);
            assert!(discovered.projects[0]
                .selectors()
                .iter()
                .all(|s| s.priority() != SelectorPriority::ContentFile));
        }

        #[test]
        fn test_versions_are_recorded_per_config() {
            let ws = Workspace::new();
            let config = ws.write("tailwind.config.js", "module.exports = {}");

            let discovered = ws.discovery(Some(Version::new(3, 4, 3))).discover(None);
            assert_eq!(discovered.versions.get(&config), Some(&Version::new(3, 4, 3)));
        }
    }

    mod explicit {
        use super::*;

        #[test]
        fn test_map_entries_become_user_configured() {
            let ws = Workspace::new();
            let map = ConfigFileMap::parse(&json!({
                "apps/web/tailwind.config.js": ["apps/web/**", "!apps/web/legacy/**"],
                "apps/docs/tailwind.config.js": "apps/docs/**",
            }))
            .unwrap();

            let discovered = ws.discovery(None).discover(Some(&map));
            assert_eq!(discovered.projects.len(), 2);
            for project in &discovered.projects {
                assert!(project.is_user_configured());
                assert!(project
                    .selectors()
                    .iter()
                    .all(|s| s.priority() == SelectorPriority::UserConfigured));
            }

            let web = discovered
                .projects
                .iter()
                .find(|p| p.config_path() == Some(ws.root.join("apps/web/tailwind.config.js").as_path()))
                .unwrap();
            let negated = format!("!{}/apps/web/legacy/**", ws.root);
            assert!(web.selectors().iter().any(|s| s.pattern() == negated));
        }

        #[test]
        fn test_bare_path_applies_everywhere() {
            let ws = Workspace::new();
            let map = ConfigFileMap::parse(&json!("tailwind.config.js")).unwrap();

            let discovered = ws.discovery(None).discover(Some(&map));
            let project = &discovered.projects[0];
            assert_eq!(project.selectors().len(), 1);
            assert!(project.selectors()[0].matches(&ws.root.join("deep/nested/page.html")));
        }
    }
}

//! Drives the orchestration core end to end against a fake client.
//!
//! The fake records every registration, unregistration, diagnostics publish
//! and teardown notification in one ordered log, so tests can assert both
//! what was sent and in which order.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use semver::Version;
use serde_json::json;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tower_lsp_server::lsp_types::ClientCapabilities;
use tower_lsp_server::lsp_types::Diagnostic;
use tower_lsp_server::lsp_types::InitializeParams;
use tower_lsp_server::lsp_types::Registration;
use tower_lsp_server::lsp_types::Unregistration;
use tower_lsp_server::lsp_types::Uri;
use tower_lsp_server::lsp_types::WorkspaceFolder;
use twls_conf::WatcherMode;
use twls_project::ConfigLoader;
use twls_project::StaticConfigLoader;
use twls_project::VersionResolver;
use twls_server::registered_globs;
use twls_server::BackendKind;
use twls_server::BasicProjectFactory;
use twls_server::Host;
use twls_server::InitOutcome;
use twls_server::LifecycleState;
use twls_server::Peer;
use twls_server::Services;
use twls_server::SortSelectionError;
use twls_server::SortSelectionResult;
use twls_server::WatchOrchestrator;
use twls_workspace::normalize_path;
use twls_workspace::path_to_uri;
use twls_workspace::ExcludeSet;
use twls_workspace::FileChangeEvent;
use twls_workspace::FileChangeKind;

const WATCHED_FILES: &str = "workspace/didChangeWatchedFiles";
const COMPLETION: &str = "textDocument/completion";

#[derive(Default)]
struct FakePeer {
    log: Mutex<Vec<String>>,
    registrations: Mutex<Vec<Registration>>,
    outstanding: Mutex<Vec<String>>,
    settings: Mutex<Value>,
    configuration_calls: AtomicUsize,
    held: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakePeer {
    /// Make the next `workspace/configuration` answer wait until the returned
    /// sender fires. The answer is the settings as of the request.
    fn hold_configuration(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.held.lock().unwrap() = Some(rx);
        tx
    }

    fn set_settings(&self, settings: Value) {
        *self.settings.lock().unwrap() = settings;
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.log().iter().filter(|e| *e == entry).count()
    }

    fn position(&self, entry: &str) -> usize {
        self.log()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("{entry} not in log"))
    }

    fn registrations(&self) -> Vec<Registration> {
        self.registrations.lock().unwrap().clone()
    }

    fn outstanding(&self, method: &str) -> usize {
        self.outstanding
            .lock()
            .unwrap()
            .iter()
            .filter(|m| *m == method)
            .count()
    }
}

#[async_trait]
impl Peer for FakePeer {
    async fn register_capability(&self, registrations: Vec<Registration>) -> Result<()> {
        for registration in &registrations {
            self.log
                .lock()
                .unwrap()
                .push(format!("register:{}", registration.method));
            self.outstanding
                .lock()
                .unwrap()
                .push(registration.method.clone());
        }
        self.registrations.lock().unwrap().extend(registrations);
        Ok(())
    }

    async fn unregister_capability(&self, unregisterations: Vec<Unregistration>) -> Result<()> {
        for unregistration in unregisterations {
            self.log
                .lock()
                .unwrap()
                .push(format!("unregister:{}", unregistration.method));
            let mut outstanding = self.outstanding.lock().unwrap();
            if let Some(i) = outstanding.iter().position(|m| *m == unregistration.method) {
                outstanding.remove(i);
            }
        }
        Ok(())
    }

    async fn configuration(&self, _scope: Option<Uri>) -> Result<Value> {
        let settings = self.settings.lock().unwrap().clone();
        let held = self.held.lock().unwrap().take();
        self.configuration_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(held) = held {
            let _ = held.await;
        }
        Ok(settings)
    }

    async fn publish_diagnostics(&self, uri: Uri, _diagnostics: Vec<Diagnostic>, _version: Option<i32>) {
        self.log
            .lock()
            .unwrap()
            .push(format!("diagnostics:{}", uri.as_str()));
    }

    async fn projects_destroyed(&self) {
        self.log.lock().unwrap().push("destroyed".to_string());
    }
}

struct FakeResolver(Mutex<Version>);

impl FakeResolver {
    fn set(&self, version: Version) {
        *self.0.lock().unwrap() = version;
    }
}

impl VersionResolver for FakeResolver {
    fn resolve(&self, _from_dir: &Utf8Path) -> Option<Version> {
        Some(self.0.lock().unwrap().clone())
    }
}

struct Fixture {
    _tmp: TempDir,
    root: Utf8PathBuf,
    peer: Arc<FakePeer>,
    resolver: Arc<FakeResolver>,
    host: Arc<Host>,
}

impl Fixture {
    /// A workspace with `files`, behind a client that watches files and
    /// accepts dynamic registrations unless `dynamic` is false.
    async fn new(files: &[(&str, &str)], dynamic: bool) -> Self {
        let tmp = TempDir::new().unwrap();
        let root = normalize_path(&Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap());
        for (rel, contents) in files {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, contents).unwrap();
        }

        let peer = Arc::new(FakePeer::default());
        let resolver = Arc::new(FakeResolver(Mutex::new(Version::new(3, 4, 1))));
        let loader: Arc<dyn ConfigLoader> = Arc::new(StaticConfigLoader);
        let services = Services {
            factory: Arc::new(BasicProjectFactory::new(Arc::clone(&loader))),
            resolver: resolver.clone(),
            loader,
        };
        let host = Host::new(peer.clone(), services);

        let capabilities: ClientCapabilities = serde_json::from_value(json!({
            "textDocument": { "completion": { "dynamicRegistration": dynamic } },
            "workspace": { "didChangeWatchedFiles": { "dynamicRegistration": dynamic } },
        }))
        .unwrap();
        let params = InitializeParams {
            capabilities,
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: path_to_uri(&root).unwrap(),
                name: "ws".to_string(),
            }]),
            ..Default::default()
        };
        host.initialize(&params).await;

        Self {
            _tmp: tmp,
            root,
            peer,
            resolver,
            host,
        }
    }

    fn path(&self, rel: &str) -> Utf8PathBuf {
        self.root.join(rel)
    }

    fn uri(&self, rel: &str) -> Uri {
        path_to_uri(&self.path(rel)).unwrap()
    }

    fn write(&self, rel: &str, contents: &str) {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    async fn open(&self, rel: &str) {
        self.host.did_open(self.uri(rel), 1).await;
    }

    async fn project_count(&self) -> usize {
        self.host.with_session(|session| session.projects().len()).await
    }

    /// Start `init` in the background and return once it is waiting on the
    /// held configuration request.
    async fn init_in_background(&self) -> tokio::task::JoinHandle<InitOutcome> {
        let host = Arc::clone(&self.host);
        let init = tokio::spawn(async move { host.init().await });
        while self.peer.configuration_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        init
    }

    async fn wait_for_destroyed(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.peer.count("destroyed") < count || self.host.state() != LifecycleState::Ready {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {count} restart(s)"));
    }

    async fn version_of(&self, rel: &str) -> Option<String> {
        self.host
            .get_project(&self.uri(rel))
            .await
            .map(|info| info.version)
    }
}

const CONFIG: &str = "module.exports = { content: ['./src/**/*.html'] }";

fn two_projects() -> Vec<(&'static str, &'static str)> {
    vec![
        ("a/package.json", "{}"),
        ("a/tailwind.config.js", CONFIG),
        ("b/package.json", "{}"),
        ("b/tailwind.config.js", CONFIG),
    ]
}

mod init {
    use super::*;

    #[tokio::test]
    async fn test_routes_documents_between_two_projects() {
        let fx = Fixture::new(&two_projects(), true).await;
        assert_eq!(fx.host.init().await, InitOutcome::Ready { projects: 2 });

        fx.open("a/src/index.html").await;
        assert_eq!(fx.version_of("a/src/index.html").await.as_deref(), Some("3.4.1"));

        // b was never opened, so it stays disabled
        assert_eq!(fx.version_of("b/src/index.html").await, None);

        fx.open("c/unrelated.html").await;
        assert_eq!(fx.version_of("c/unrelated.html").await, None);
    }

    #[tokio::test]
    async fn test_single_project_is_the_catch_all() {
        let fx = Fixture::new(&[("tailwind.config.js", CONFIG)], true).await;
        assert_eq!(fx.host.init().await, InitOutcome::Ready { projects: 1 });

        fx.open("docs/anything.md").await;
        assert!(fx.version_of("docs/anything.md").await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_init_runs_once() {
        let fx = Fixture::new(&two_projects(), true).await;
        let (first, second) = tokio::join!(fx.host.init(), fx.host.init());

        assert_eq!(first, InitOutcome::Ready { projects: 2 });
        assert_eq!(first, second);
        assert_eq!(fx.peer.configuration_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.host.init().await, first);
    }

    #[tokio::test]
    async fn test_invalid_config_file_map_yields_no_projects() {
        let fx = Fixture::new(&two_projects(), true).await;
        fx.peer.set_settings(json!({
            "experimental": { "configFile": { "a/tailwind.config.js": 42 } }
        }));

        assert!(matches!(fx.host.init().await, InitOutcome::Failed(_)));
        assert_eq!(fx.project_count().await, 0);
    }

    #[tokio::test]
    async fn test_user_configured_projects_start_enabled() {
        let fx = Fixture::new(&two_projects(), true).await;
        fx.peer.set_settings(json!({
            "experimental": { "configFile": { "a/tailwind.config.js": "a/**" } }
        }));

        assert_eq!(fx.host.init().await, InitOutcome::Ready { projects: 1 });
        assert_eq!(fx.version_of("a/src/index.html").await.as_deref(), Some("3.4.1"));
        assert_eq!(fx.version_of("b/src/index.html").await, None);
    }

    #[tokio::test]
    async fn test_local_backends_follow_watcher_setting() {
        let fx = Fixture::new(&[("tailwind.config.js", CONFIG)], false).await;
        fx.peer.set_settings(json!({ "watcher": "polling" }));
        fx.host.init().await;

        let kind = fx.host.with_session(|session| session.watch().kind()).await;
        assert_eq!(kind, BackendKind::Polling);
        assert!(fx.peer.registrations().is_empty());
    }
}

mod capabilities {
    use super::*;

    #[tokio::test]
    async fn test_registers_providers_after_init() {
        let fx = Fixture::new(&two_projects(), true).await;
        fx.host.init().await;

        assert_eq!(fx.peer.count("register:textDocument/hover"), 1);
        assert_eq!(fx.peer.outstanding(COMPLETION), 1);
    }

    #[tokio::test]
    async fn test_separator_is_added_to_triggers_once() {
        let config = "module.exports = { separator: '_', content: ['./src/**/*.html'] }";
        let fx = Fixture::new(&[("tailwind.config.js", config)], true).await;
        fx.host.init().await;
        fx.open("src/index.html").await;

        assert_eq!(fx.peer.outstanding(COMPLETION), 1);

        let completion = fx
            .peer
            .registrations()
            .into_iter()
            .rev()
            .find(|r| r.method == COMPLETION)
            .unwrap();
        let triggers = completion.register_options.unwrap()["triggerCharacters"].clone();
        assert!(triggers.as_array().unwrap().contains(&json!("_")));
    }

    #[tokio::test]
    async fn test_zero_projects_still_register_base_triggers() {
        let fx = Fixture::new(&[("index.html", "<p></p>")], true).await;
        assert_eq!(fx.host.init().await, InitOutcome::Ready { projects: 0 });
        assert_eq!(fx.peer.outstanding(COMPLETION), 1);
    }
}

mod restart {
    use super::*;

    #[tokio::test]
    async fn test_tears_down_in_order() {
        let fx = Fixture::new(&two_projects(), true).await;
        fx.host.init().await;
        fx.open("a/src/index.html").await;

        assert_eq!(fx.host.restart().await, InitOutcome::Ready { projects: 2 });

        let destroyed = fx.peer.position("destroyed");
        let providers = fx.peer.position("unregister:textDocument/hover");
        let diagnostics = fx
            .peer
            .position(&format!("diagnostics:{}", fx.uri("a/src/index.html").as_str()));
        let watchers = fx.peer.position(&format!("unregister:{WATCHED_FILES}"));

        assert!(destroyed < providers);
        assert!(providers < diagnostics);
        assert!(diagnostics < watchers);

        // rebuilt, with the open document's project enabled again
        assert_eq!(fx.peer.outstanding(COMPLETION), 1);
        assert!(fx.version_of("a/src/index.html").await.is_some());
    }

    #[tokio::test]
    async fn test_restart_supersedes_in_flight_init() {
        let fx = Fixture::new(&two_projects(), true).await;
        let (first, second) = tokio::join!(fx.host.init(), fx.host.restart());

        assert!(matches!(
            first,
            InitOutcome::Superseded | InitOutcome::Ready { .. }
        ));
        assert_eq!(second, InitOutcome::Ready { projects: 2 });
        assert_eq!(fx.project_count().await, 2);
        assert_eq!(fx.peer.outstanding(COMPLETION), 1);
    }

    #[tokio::test]
    async fn test_exclude_change_restarts() {
        let fx = Fixture::new(&two_projects(), true).await;
        fx.host.init().await;

        fx.peer.set_settings(json!({ "files": { "exclude": ["**/b/**"] } }));
        fx.host.settings_changed().await;

        assert_eq!(fx.peer.count("destroyed"), 1);
        assert_eq!(fx.project_count().await, 1);
    }

    #[tokio::test]
    async fn test_settings_change_during_init_restarts_afterwards() {
        let fx = Fixture::new(&two_projects(), true).await;
        let release = fx.peer.hold_configuration();
        let init = fx.init_in_background().await;

        fx.peer.set_settings(json!({ "files": { "exclude": ["**/b/**"] } }));
        fx.host.settings_changed().await;
        assert_eq!(fx.peer.count("destroyed"), 0);

        release.send(()).unwrap();
        // the first attempt still ran with the settings it fetched
        assert_eq!(init.await.unwrap(), InitOutcome::Ready { projects: 2 });

        fx.wait_for_destroyed(1).await;
        assert_eq!(fx.project_count().await, 1);
        assert_eq!(fx.peer.count("destroyed"), 1);
    }

    #[tokio::test]
    async fn test_other_setting_changes_do_not_restart() {
        let fx = Fixture::new(&two_projects(), true).await;
        fx.host.init().await;

        fx.peer.set_settings(json!({ "debug": true }));
        fx.host.settings_changed().await;

        assert_eq!(fx.peer.count("destroyed"), 0);
        assert!(fx.host.with_session(|session| session.settings().debug()).await);
    }
}

mod file_events {
    use super::*;

    fn event(fx: &Fixture, rel: &str, kind: FileChangeKind) -> Vec<FileChangeEvent> {
        vec![FileChangeEvent::new(fx.path(rel), kind)]
    }

    #[tokio::test]
    async fn test_lock_change_without_drift_is_forwarded() {
        let fx = Fixture::new(&two_projects(), true).await;
        fx.host.init().await;

        fx.host
            .on_file_events(event(&fx, "package-lock.json", FileChangeKind::Changed))
            .await;
        assert_eq!(fx.peer.count("destroyed"), 0);
    }

    #[tokio::test]
    async fn test_lock_change_with_drift_restarts() {
        let fx = Fixture::new(&two_projects(), true).await;
        fx.host.init().await;

        fx.resolver.set(Version::new(3, 4, 3));
        fx.host
            .on_file_events(event(&fx, "pnpm-lock.yaml", FileChangeKind::Changed))
            .await;

        assert_eq!(fx.peer.count("destroyed"), 1);
        assert_eq!(fx.project_count().await, 2);
    }

    #[tokio::test]
    async fn test_new_stylesheet_directive_restarts_once() {
        let fx = Fixture::new(&[("tailwind.config.js", CONFIG)], true).await;
        fx.host.init().await;

        fx.write("styles/app.css", "@config \"../tailwind.config.js\";");
        fx.host
            .on_file_events(event(&fx, "styles/app.css", FileChangeKind::Created))
            .await;
        assert_eq!(fx.peer.count("destroyed"), 1);

        fx.write(
            "styles/app.css",
            "@config \"../tailwind.config.js\";\n.btn { color: red }",
        );
        fx.host
            .on_file_events(event(&fx, "styles/app.css", FileChangeKind::Changed))
            .await;
        assert_eq!(fx.peer.count("destroyed"), 1);
    }

    #[tokio::test]
    async fn test_config_creation_and_deletion_restart() {
        let fx = Fixture::new(&two_projects(), true).await;
        fx.host.init().await;

        fx.write("c/tailwind.config.js", CONFIG);
        fx.host
            .on_file_events(event(&fx, "c/tailwind.config.js", FileChangeKind::Created))
            .await;
        assert_eq!(fx.project_count().await, 3);

        std::fs::remove_file(fx.path("a/tailwind.config.js")).unwrap();
        fx.host
            .on_file_events(event(&fx, "a/tailwind.config.js", FileChangeKind::Deleted))
            .await;
        assert_eq!(fx.peer.count("destroyed"), 2);
        assert_eq!(fx.project_count().await, 2);
    }

    #[tokio::test]
    async fn test_config_created_during_init_restarts_afterwards() {
        let fx = Fixture::new(&two_projects(), true).await;
        let release = fx.peer.hold_configuration();
        let init = fx.init_in_background().await;

        fx.write("c/tailwind.config.js", CONFIG);
        fx.host
            .on_file_events(event(&fx, "c/tailwind.config.js", FileChangeKind::Created))
            .await;
        assert_eq!(fx.peer.count("destroyed"), 0);

        release.send(()).unwrap();
        init.await.unwrap();

        fx.wait_for_destroyed(1).await;
        assert_eq!(fx.project_count().await, 3);
    }

    #[tokio::test]
    async fn test_excluded_events_are_ignored() {
        let fx = Fixture::new(&two_projects(), true).await;
        fx.host.init().await;

        fx.host
            .on_file_events(event(
                &fx,
                "node_modules/pkg/tailwind.config.js",
                FileChangeKind::Created,
            ))
            .await;
        assert_eq!(fx.peer.count("destroyed"), 0);
    }
}

mod watch {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_patterns_register_once() {
        let peer = FakePeer::default();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut watch = WatchOrchestrator::new();

        watch
            .start(
                &peer,
                true,
                Utf8Path::new("/ws"),
                &ExcludeSet::empty(),
                WatcherMode::Auto,
                tx,
            )
            .await;
        watch.watch_patterns(&peer, vec!["**/*.css".to_string()]).await;
        watch.watch_patterns(&peer, vec!["**/*.css".to_string()]).await;

        let registered: Vec<String> = peer
            .registrations()
            .iter()
            .flat_map(registered_globs)
            .filter(|glob| glob == "**/*.css")
            .collect();
        assert_eq!(registered.len(), 1);
        assert_eq!(watch.kind(), BackendKind::ClientPush);
    }

    #[tokio::test]
    async fn test_content_globs_are_registered_after_init() {
        let fx = Fixture::new(&two_projects(), true).await;
        fx.host.init().await;

        let globs: Vec<String> = fx
            .peer
            .registrations()
            .iter()
            .flat_map(registered_globs)
            .collect();
        assert!(globs.contains(&format!("{}/a/src/**/*.html", fx.root)));
        assert!(globs.contains(&format!("{}/b/src/**/*.html", fx.root)));
    }
}

mod requests {
    use super::*;

    #[tokio::test]
    async fn test_sort_selection_without_project() {
        let fx = Fixture::new(&two_projects(), true).await;
        fx.host.init().await;

        let result = fx
            .host
            .sort_selection(&fx.uri("c/page.html"), vec!["p-4 flex".to_string()])
            .await;
        assert_eq!(
            result,
            SortSelectionResult::Failed {
                error: SortSelectionError::NoProject
            }
        );
    }

    #[tokio::test]
    async fn test_sort_selection_with_project() {
        let fx = Fixture::new(&two_projects(), true).await;
        fx.host.init().await;
        fx.open("a/src/index.html").await;

        let result = fx
            .host
            .sort_selection(&fx.uri("a/src/index.html"), vec!["p-4 flex".to_string()])
            .await;
        assert_eq!(
            result,
            SortSelectionResult::Sorted {
                class_lists: vec!["flex p-4".to_string()]
            }
        );
    }
}

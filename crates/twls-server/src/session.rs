//! Everything one (re)initialization produces, plus the open documents.
//!
//! The session is owned by the [`Host`](crate::host::Host) behind a single
//! lock. Methods that talk to the client take the peer as an argument so the
//! session never holds on to it.

use std::sync::Arc;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use rustc_hash::FxHashMap;
use semver::Version;
use tower_lsp_server::lsp_types::ClientCapabilities;
use tower_lsp_server::lsp_types::Uri;
use twls_conf::Settings;
use twls_conf::WatcherMode;
use twls_project::Discovered;
use twls_project::ProjectId;
use twls_project::ProjectRegistry;
use twls_project::RegisteredProject;
use twls_project::SelectorPriority;
use twls_project::VersionResolver;
use twls_workspace::uri_to_path;
use twls_workspace::EventSender;
use twls_workspace::ExcludeSet;
use twls_workspace::FileChangeEvent;

use crate::capabilities::supports_dynamic_providers;
use crate::capabilities::supports_dynamic_watchers;
use crate::capabilities::CapabilityController;
use crate::classify::ClassifyContext;
use crate::client::Peer;
use crate::project::ProjectFactory;
use crate::project::ProjectRuntime;
use crate::watch::WatchOrchestrator;

pub type Projects = ProjectRegistry<Box<dyn ProjectRuntime>>;
pub type Project = RegisteredProject<Box<dyn ProjectRuntime>>;

pub struct Session {
    client_capabilities: ClientCapabilities,
    root: Option<Utf8PathBuf>,
    settings: Settings,
    exclude: ExcludeSet,
    projects: Projects,
    /// Version recorded per config path at the last discovery.
    versions: FxHashMap<Utf8PathBuf, Version>,
    /// Config path declared by each stylesheet at the last discovery.
    css_configs: FxHashMap<Utf8PathBuf, Utf8PathBuf>,
    /// Open documents and their versions. Text is not kept here.
    documents: FxHashMap<Uri, i32>,
    watch: WatchOrchestrator,
    capabilities: CapabilityController,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            client_capabilities: ClientCapabilities::default(),
            root: None,
            settings: Settings::default(),
            exclude: ExcludeSet::empty(),
            projects: Projects::new(),
            versions: FxHashMap::default(),
            css_configs: FxHashMap::default(),
            documents: FxHashMap::default(),
            watch: WatchOrchestrator::new(),
            capabilities: CapabilityController::new(false),
        }
    }
}

impl Session {
    pub fn set_client_capabilities(&mut self, capabilities: ClientCapabilities) {
        self.capabilities = CapabilityController::new(supports_dynamic_providers(&capabilities));
        self.client_capabilities = capabilities;
    }

    #[must_use]
    pub fn client_capabilities(&self) -> &ClientCapabilities {
        &self.client_capabilities
    }

    pub fn set_root(&mut self, root: Option<Utf8PathBuf>) {
        self.root = root;
    }

    #[must_use]
    pub fn root(&self) -> Option<&Utf8Path> {
        self.root.as_deref()
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    #[must_use]
    pub fn projects(&self) -> &Projects {
        &self.projects
    }

    #[must_use]
    pub fn watch(&self) -> &WatchOrchestrator {
        &self.watch
    }

    #[must_use]
    pub fn capabilities(&self) -> &CapabilityController {
        &self.capabilities
    }

    #[must_use]
    pub fn documents(&self) -> &FxHashMap<Uri, i32> {
        &self.documents
    }

    pub fn open_document(&mut self, uri: Uri, version: i32) {
        self.documents.insert(uri, version);
    }

    pub fn change_document(&mut self, uri: &Uri, version: i32) {
        if let Some(current) = self.documents.get_mut(uri) {
            *current = version;
        }
    }

    pub fn close_document(&mut self, uri: &Uri) {
        self.documents.remove(uri);
    }

    /// Separators of every live project that overrides the default.
    #[must_use]
    pub fn separators(&self) -> Vec<char> {
        self.projects
            .iter()
            .filter_map(|entry| entry.project().separator())
            .collect()
    }

    /// The enabled project that owns `uri`.
    #[must_use]
    pub fn project_for(&self, uri: &Uri) -> Option<&Project> {
        let path = uri_to_path(uri)?;
        self.projects
            .resolve(&path)
            .filter(|entry| entry.project().enabled())
    }

    #[must_use]
    pub fn project_by_id(&self, id: ProjectId) -> Option<&Project> {
        self.projects.get(id)
    }

    #[must_use]
    pub fn classify_context(&self, resolver: Arc<dyn VersionResolver>) -> ClassifyContext {
        ClassifyContext {
            exclude: self.exclude.clone(),
            resolver,
            versions: self.versions.clone(),
            css_configs: self.css_configs.clone(),
            configs: self
                .projects
                .iter()
                .filter_map(|entry| entry.descriptor().config_path())
                .map(Utf8Path::to_path_buf)
                .collect(),
        }
    }

    /// Install the result of a discovery pass: start watching, build a
    /// runtime per descriptor, wake the projects open documents belong to,
    /// and advertise providers.
    pub async fn commit(
        &mut self,
        peer: &dyn Peer,
        root: &Utf8Path,
        settings: Settings,
        discovered: Discovered,
        factory: &dyn ProjectFactory,
        events: EventSender,
    ) -> usize {
        self.exclude = ExcludeSet::new(settings.exclude());
        self.settings = settings;
        self.versions = discovered.versions;
        self.css_configs = discovered.css_configs;

        let client_push = supports_dynamic_watchers(&self.client_capabilities);
        let mode: WatcherMode = self.settings.watcher();
        self.watch
            .start(peer, client_push, root, &self.exclude, mode, events)
            .await;

        for descriptor in discovered.projects {
            let mut project = factory.create(&descriptor, &self.settings);
            if descriptor.is_user_configured() {
                project.enable();
                if let Err(err) = project.try_init().await {
                    tracing::warn!(config = ?descriptor.config_path(), error = %err, "project failed to initialize");
                    project.disable();
                }
            }
            let id = self.projects.register(descriptor, project);
            tracing::debug!(project = %id, "registered project");
        }

        let open: Vec<Uri> = self.documents.keys().cloned().collect();
        for uri in &open {
            self.enable_owner(uri).await;
        }

        let content_globs: Vec<String> = self
            .projects
            .iter()
            .flat_map(|entry| entry.descriptor().selectors())
            .filter(|selector| {
                selector.priority() == SelectorPriority::ContentFile && !selector.is_negated()
            })
            .map(|selector| selector.pattern().to_string())
            .collect();
        self.watch.watch_patterns(peer, content_globs).await;

        self.project_set_changed(peer).await;
        self.projects.len()
    }

    /// Make sure the project owning `uri` is enabled and initialized.
    /// Re-advertises providers when that changes the separator set.
    pub async fn activate(&mut self, peer: &dyn Peer, uri: &Uri) {
        let before = self.separators();
        self.enable_owner(uri).await;
        if self.separators() != before {
            self.project_set_changed(peer).await;
        }
    }

    async fn enable_owner(&mut self, uri: &Uri) {
        let Some(path) = uri_to_path(uri) else {
            return;
        };
        let Some(id) = self.projects.resolve_id(&path) else {
            tracing::debug!(path = %path, "no project owns document");
            return;
        };
        let Some(entry) = self.projects.get_mut(id) else {
            return;
        };

        let project = entry.project_mut();
        if !project.enabled() {
            project.enable();
        }
        if let Err(err) = project.try_init().await {
            tracing::warn!(project = %id, error = %err, "project failed to initialize");
            project.disable();
        }
    }

    /// Single entry point for re-advertising providers after the project set
    /// or a project's separator changed.
    pub async fn project_set_changed(&mut self, peer: &dyn Peer) {
        let separators = self.separators();
        self.capabilities.refresh(peer, separators).await;
    }

    pub async fn forward_file_events(&mut self, events: &[FileChangeEvent]) {
        for entry in self.projects.iter_mut() {
            entry.project_mut().on_file_events(events).await;
        }
    }

    pub async fn update_settings(&mut self, settings: Settings) {
        for entry in self.projects.iter_mut() {
            entry.project_mut().on_update_settings(&settings).await;
        }
        self.settings = settings;
    }

    /// Destroy every project and everything registered on their behalf.
    pub async fn teardown(&mut self, peer: &dyn Peer) {
        peer.projects_destroyed().await;

        for mut entry in self.projects.unregister_all() {
            entry.project_mut().dispose().await;
        }

        self.capabilities.clear(peer).await;

        for uri in self.documents.keys() {
            peer.publish_diagnostics(uri.clone(), Vec::new(), None).await;
        }

        self.watch.dispose(peer).await;
        self.versions.clear();
        self.css_configs.clear();
    }

    pub async fn shutdown(&mut self, peer: &dyn Peer) {
        for mut entry in self.projects.unregister_all() {
            entry.project_mut().dispose().await;
        }
        self.watch.dispose(peer).await;
    }
}

//! The orchestration core: lifecycle, change handling, and request routing.
//!
//! The LSP surface in [`crate::server`] is a thin adapter over [`Host`];
//! tests drive the host directly through a fake [`Peer`].

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use serde_json::json;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::sync::RwLockReadGuard;
use tower_lsp_server::lsp_types::CodeActionParams;
use tower_lsp_server::lsp_types::CodeActionResponse;
use tower_lsp_server::lsp_types::ColorInformation;
use tower_lsp_server::lsp_types::ColorPresentation;
use tower_lsp_server::lsp_types::ColorPresentationParams;
use tower_lsp_server::lsp_types::CompletionItem;
use tower_lsp_server::lsp_types::CompletionParams;
use tower_lsp_server::lsp_types::CompletionResponse;
use tower_lsp_server::lsp_types::DocumentColorParams;
use tower_lsp_server::lsp_types::DocumentLink;
use tower_lsp_server::lsp_types::DocumentLinkParams;
use tower_lsp_server::lsp_types::FileChangeType;
use tower_lsp_server::lsp_types::FileEvent;
use tower_lsp_server::lsp_types::Hover;
use tower_lsp_server::lsp_types::HoverParams;
use tower_lsp_server::lsp_types::InitializeParams;
use tower_lsp_server::lsp_types::Uri;
use twls_conf::Settings;
use twls_project::ConfigLoader;
use twls_project::Discovery;
use twls_project::NodeModulesResolver;
use twls_project::ProjectId;
use twls_project::StaticConfigLoader;
use twls_project::VersionResolver;
use twls_workspace::path_to_uri;
use twls_workspace::uri_to_path;
use twls_workspace::EventReceiver;
use twls_workspace::EventSender;
use twls_workspace::ExcludeSet;
use twls_workspace::FileChangeEvent;
use twls_workspace::FileChangeKind;

use crate::classify::classify;
use crate::classify::Decision;
use crate::client::Peer;
use crate::ext::ProjectInfo;
use crate::ext::SortSelectionError;
use crate::ext::SortSelectionResult;
use crate::lifecycle::Begin;
use crate::lifecycle::Completion;
use crate::lifecycle::InitOutcome;
use crate::lifecycle::Lifecycle;
use crate::lifecycle::LifecycleState;
use crate::project::BasicProjectFactory;
use crate::project::ProjectFactory;
use crate::session::Project;
use crate::session::Session;

const PROJECT_ID_KEY: &str = "_projectId";
const PROJECT_DATA_KEY: &str = "_data";

/// Pluggable collaborators the host builds projects with.
#[derive(Clone)]
pub struct Services {
    pub factory: Arc<dyn ProjectFactory>,
    pub resolver: Arc<dyn VersionResolver>,
    pub loader: Arc<dyn ConfigLoader>,
}

impl Default for Services {
    fn default() -> Self {
        let loader: Arc<dyn ConfigLoader> = Arc::new(StaticConfigLoader);
        Self {
            factory: Arc::new(BasicProjectFactory::new(Arc::clone(&loader))),
            resolver: Arc::new(NodeModulesResolver),
            loader,
        }
    }
}

/// Triggers that arrived while an attempt was in flight. They are replayed
/// once the current generation completes.
#[derive(Default)]
struct Deferred {
    settings: bool,
    events: Vec<FileChangeEvent>,
}

pub struct Host {
    peer: Arc<dyn Peer>,
    services: Services,
    session: RwLock<Session>,
    lifecycle: Lifecycle,
    events: EventSender,
    deferred: Mutex<Deferred>,
}

impl Host {
    /// Build the host and start the loop that feeds watcher batches into
    /// classification. Must be called from within a Tokio runtime.
    pub fn new(peer: Arc<dyn Peer>, services: Services) -> Arc<Self> {
        let (events, rx) = tokio::sync::mpsc::unbounded_channel();
        let host = Arc::new(Self {
            peer,
            services,
            session: RwLock::new(Session::default()),
            lifecycle: Lifecycle::new(),
            events,
            deferred: Mutex::default(),
        });
        tokio::spawn(Self::pump_events(Arc::downgrade(&host), rx));
        host
    }

    async fn pump_events(host: Weak<Self>, mut rx: EventReceiver) {
        while let Some(batch) = rx.recv().await {
            let Some(host) = host.upgrade() else {
                break;
            };
            host.on_file_events(batch).await;
        }
        tracing::debug!("file event loop stopped");
    }

    pub async fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        let session = self.session.read().await;
        f(&session)
    }

    pub async fn with_session_mut<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.session.write().await;
        f(&mut session)
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Record what the client told us in `initialize`.
    pub async fn initialize(&self, params: &InitializeParams) {
        let root = workspace_root(params);
        match &root {
            Some(root) => tracing::info!(root = %root, "workspace root"),
            None => tracing::warn!("no workspace root, running without projects"),
        }

        self.with_session_mut(|session| {
            session.set_client_capabilities(params.capabilities.clone());
            session.set_root(root);
        })
        .await;
    }

    /// Initialize once. Concurrent callers share the in-flight attempt.
    pub async fn init(self: &Arc<Self>) -> InitOutcome {
        match self.lifecycle.begin_init() {
            Begin::Ready(outcome) => outcome,
            Begin::Joined(attempt) => attempt.wait().await,
            Begin::Started(attempt, completion) => {
                self.spawn_startup(completion);
                attempt.wait().await
            }
        }
    }

    /// Tear everything down and run startup again. Any attempt still in
    /// flight is superseded and will not commit.
    pub async fn restart(self: &Arc<Self>) -> InitOutcome {
        let (attempt, completion) = self.lifecycle.begin_restart();
        tracing::info!(generation = completion.generation(), "restarting");

        {
            let mut session = self.session.write().await;
            session.teardown(self.peer.as_ref()).await;
        }

        self.spawn_startup(completion);
        attempt.wait().await
    }

    fn spawn_startup(self: &Arc<Self>, completion: Completion) {
        let host = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = host.run_startup(completion.generation()).await;
            match &outcome {
                InitOutcome::Ready { projects } => tracing::info!(projects, "initialized"),
                InitOutcome::Superseded => tracing::debug!("initialization superseded"),
                InitOutcome::Failed(reason) => tracing::error!(reason = %reason, "initialization failed"),
            }
            if host.lifecycle.complete(completion, outcome) {
                host.replay_deferred().await;
            }
        });
    }

    fn lock_deferred(&self) -> MutexGuard<'_, Deferred> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn replay_deferred(self: &Arc<Self>) {
        let Deferred { settings, events } = std::mem::take(&mut *self.lock_deferred());
        if settings {
            tracing::debug!("replaying settings change from initialization");
            self.settings_changed().await;
        }
        if !events.is_empty() {
            tracing::debug!(count = events.len(), "replaying file events from initialization");
            self.on_file_events(events).await;
        }
    }

    async fn run_startup(&self, generation: u64) -> InitOutcome {
        let Some(root) = self.with_session(|session| session.root().map(Utf8Path::to_path_buf)).await else {
            return InitOutcome::Ready { projects: 0 };
        };

        let settings = self.load_settings(&root).await;

        let explicit = match settings.config_file_map() {
            Ok(explicit) => explicit,
            Err(err) => {
                tracing::error!(error = %err, "invalid experimental.configFile, no projects created");
                let mut session = self.session.write().await;
                if self.lifecycle.is_current(generation) {
                    session.set_settings(settings);
                }
                return InitOutcome::Failed(err.to_string());
            }
        };

        let discovery = Discovery::new(
            root.clone(),
            ExcludeSet::new(settings.exclude()),
            Arc::clone(&self.services.resolver),
            Arc::clone(&self.services.loader),
        );
        let discovered =
            match tokio::task::spawn_blocking(move || discovery.discover(explicit.as_ref())).await {
                Ok(discovered) => discovered,
                Err(err) => {
                    tracing::error!(error = %err, "discovery task failed");
                    return InitOutcome::Failed(err.to_string());
                }
            };

        let mut session = self.session.write().await;
        if !self.lifecycle.is_current(generation) {
            tracing::debug!(generation, "dropping results of superseded discovery");
            return InitOutcome::Superseded;
        }

        let projects = session
            .commit(
                self.peer.as_ref(),
                &root,
                settings,
                discovered,
                self.services.factory.as_ref(),
                self.events.clone(),
            )
            .await;
        InitOutcome::Ready { projects }
    }

    /// File settings overlaid with what the client returns. Fetched fresh
    /// on every call.
    async fn load_settings(&self, root: &Utf8Path) -> Settings {
        let settings = Settings::new(root.as_std_path()).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to load settings files, using defaults");
            Settings::default()
        });

        let client = match self.peer.configuration(path_to_uri(root)).await {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(error = %err, "client settings unavailable");
                return settings;
            }
        };

        settings.clone().with_client_settings(&client).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "ignoring invalid client settings");
            settings
        })
    }

    /// Re-read settings after `workspace/didChangeConfiguration`.
    pub async fn settings_changed(self: &Arc<Self>) {
        {
            // checked under the deferred lock so a replay cannot miss it
            let mut deferred = self.lock_deferred();
            if self.lifecycle.state() != LifecycleState::Ready {
                tracing::debug!("deferring settings change until initialization completes");
                deferred.settings = true;
                return;
            }
        }
        let Some(root) = self.with_session(|session| session.root().map(Utf8Path::to_path_buf)).await else {
            return;
        };

        let next = self.load_settings(&root).await;

        let needs_restart = {
            let mut session = self.session.write().await;
            if session.settings().requires_restart(&next) {
                true
            } else {
                session.update_settings(next).await;
                false
            }
        };

        if needs_restart {
            tracing::info!("exclude patterns or config file map changed");
            self.restart().await;
        }
    }

    /// Classify a batch of changes and either restart or hand the batch to
    /// every project.
    pub async fn on_file_events(self: &Arc<Self>, events: Vec<FileChangeEvent>) {
        {
            let mut deferred = self.lock_deferred();
            if self.lifecycle.state() != LifecycleState::Ready {
                tracing::debug!(count = events.len(), "deferring file events until initialization completes");
                deferred.events.extend(events);
                return;
            }
        }

        let ctx = self
            .with_session(|session| session.classify_context(Arc::clone(&self.services.resolver)))
            .await;
        let decision = match tokio::task::spawn_blocking(move || classify(&events, &ctx)).await {
            Ok(decision) => decision,
            Err(err) => {
                tracing::error!(error = %err, "file event classification failed");
                return;
            }
        };

        match decision {
            Decision::Restart(reason) => {
                tracing::info!(reason = %reason, "project topology changed");
                self.restart().await;
            }
            Decision::Forward(events) => {
                if events.is_empty() {
                    return;
                }
                self.session.write().await.forward_file_events(&events).await;
            }
        }
    }

    /// `workspace/didChangeWatchedFiles` from a client that watches for us.
    pub fn client_file_events(&self, changes: Vec<FileEvent>) {
        let batch: Vec<FileChangeEvent> = changes
            .into_iter()
            .filter_map(|change| {
                let path = uri_to_path(&change.uri)?;
                let kind = if change.typ == FileChangeType::CREATED {
                    FileChangeKind::Created
                } else if change.typ == FileChangeType::DELETED {
                    FileChangeKind::Deleted
                } else {
                    FileChangeKind::Changed
                };
                Some(FileChangeEvent::new(path, kind))
            })
            .collect();

        if !batch.is_empty() && self.events.send(batch).is_err() {
            tracing::debug!("file event loop closed, dropping client events");
        }
    }

    pub async fn did_open(&self, uri: Uri, version: i32) {
        let mut session = self.session.write().await;
        session.open_document(uri.clone(), version);
        // before commit there is nothing to route to; commit enables the
        // owners of documents opened by then
        session.activate(self.peer.as_ref(), &uri).await;
    }

    pub async fn did_change(&self, uri: &Uri, version: i32) {
        self.with_session_mut(|session| session.change_document(uri, version))
            .await;
    }

    pub async fn did_close(&self, uri: &Uri) {
        self.with_session_mut(|session| session.close_document(uri))
            .await;
    }

    pub async fn shutdown(&self) {
        let mut session = self.session.write().await;
        session.shutdown(self.peer.as_ref()).await;
    }

    /// The enabled project that owns `uri`, kept behind the read lock.
    pub async fn project_for(&self, uri: &Uri) -> Option<RwLockReadGuard<'_, Project>> {
        let session = self.session.read().await;
        RwLockReadGuard::try_map(session, |session| session.project_for(uri)).ok()
    }

    async fn project_by_id(&self, id: ProjectId) -> Option<RwLockReadGuard<'_, Project>> {
        let session = self.session.read().await;
        RwLockReadGuard::try_map(session, |session| session.project_by_id(id)).ok()
    }

    pub async fn sort_selection(&self, uri: &Uri, class_lists: Vec<String>) -> SortSelectionResult {
        let Some(entry) = self.project_for(uri).await else {
            return SortSelectionResult::Failed {
                error: SortSelectionError::NoProject,
            };
        };

        match entry.project().sort_class_lists(class_lists).await {
            Ok(class_lists) => SortSelectionResult::Sorted { class_lists },
            Err(err) => {
                tracing::warn!(project = %entry.id(), error = %err, "failed to sort class lists");
                SortSelectionResult::Failed {
                    error: SortSelectionError::Unknown,
                }
            }
        }
    }

    pub async fn get_project(&self, uri: &Uri) -> Option<ProjectInfo> {
        let entry = self.project_for(uri).await?;
        Some(ProjectInfo {
            version: entry.project().version().to_string(),
        })
    }

    pub async fn hover(&self, params: HoverParams) -> Option<Hover> {
        let uri = params.text_document_position_params.text_document.uri.clone();
        let entry = self.project_for(&uri).await?;
        entry.project().hover(params).await
    }

    /// Completion items carry the id of the project that produced them so
    /// `completionItem/resolve` reaches the same project.
    pub async fn completion(&self, params: CompletionParams) -> Option<CompletionResponse> {
        let uri = params.text_document_position.text_document.uri.clone();
        let entry = self.project_for(&uri).await?;
        let id = entry.id();

        let tag = |items: &mut Vec<CompletionItem>| {
            for item in items {
                let data = item.data.take().unwrap_or(Value::Null);
                item.data = Some(json!({ PROJECT_ID_KEY: id.index(), PROJECT_DATA_KEY: data }));
            }
        };

        let mut response = entry.project().completion(params).await?;
        match &mut response {
            CompletionResponse::Array(items) => tag(items),
            CompletionResponse::List(list) => tag(&mut list.items),
        }
        Some(response)
    }

    pub async fn resolve_completion(&self, mut item: CompletionItem) -> CompletionItem {
        let Some(id) = item
            .data
            .as_ref()
            .and_then(|data| data.get(PROJECT_ID_KEY))
            .and_then(Value::as_u64)
            .and_then(|raw| u32::try_from(raw).ok())
            .map(ProjectId::from_raw)
        else {
            return item;
        };

        item.data = item
            .data
            .take()
            .and_then(|mut data| data.get_mut(PROJECT_DATA_KEY).map(Value::take))
            .filter(|data| !data.is_null());

        match self.project_by_id(id).await {
            Some(entry) => entry.project().resolve_completion(item).await,
            None => item,
        }
    }

    pub async fn document_colors(&self, params: DocumentColorParams) -> Vec<ColorInformation> {
        let uri = params.text_document.uri.clone();
        match self.project_for(&uri).await {
            Some(entry) => entry.project().document_colors(params).await,
            None => Vec::new(),
        }
    }

    pub async fn color_presentation(&self, params: ColorPresentationParams) -> Vec<ColorPresentation> {
        let uri = params.text_document.uri.clone();
        match self.project_for(&uri).await {
            Some(entry) => entry.project().color_presentation(params).await,
            None => Vec::new(),
        }
    }

    pub async fn code_actions(&self, params: CodeActionParams) -> Option<CodeActionResponse> {
        let uri = params.text_document.uri.clone();
        let entry = self.project_for(&uri).await?;
        entry.project().code_actions(params).await
    }

    pub async fn document_links(&self, params: DocumentLinkParams) -> Option<Vec<DocumentLink>> {
        let uri = params.text_document.uri.clone();
        let entry = self.project_for(&uri).await?;
        entry.project().document_links(params).await
    }
}

/// First workspace folder, else the deprecated `rootUri`.
fn workspace_root(params: &InitializeParams) -> Option<Utf8PathBuf> {
    if let Some(folder) = params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
    {
        return uri_to_path(&folder.uri);
    }

    #[allow(deprecated)]
    params.root_uri.as_ref().and_then(uri_to_path)
}

//! Watch backend selection and deduplicated pattern registration.

use camino::Utf8Path;
use serde_json::Value;
use tower_lsp_server::lsp_types::DidChangeWatchedFilesRegistrationOptions;
use tower_lsp_server::lsp_types::FileSystemWatcher;
use tower_lsp_server::lsp_types::GlobPattern;
use tower_lsp_server::lsp_types::Registration;
use tower_lsp_server::lsp_types::Unregistration;
use twls_conf::WatcherMode;
use twls_project::client_watch_patterns;
use twls_workspace::paths::glob_base;
use twls_workspace::EventSender;
use twls_workspace::ExcludeSet;
use twls_workspace::NativeWatcher;
use twls_workspace::PollingWatcher;
use twls_workspace::WatchEntrySet;

use crate::client::Peer;

const WATCHED_FILES_METHOD: &str = "workspace/didChangeWatchedFiles";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BackendKind {
    ClientPush,
    Native,
    Polling,
    None,
}

enum Backend {
    ClientPush { registrations: Vec<Unregistration> },
    Native(NativeWatcher),
    Polling(PollingWatcher),
    None,
}

/// Owns the active watch backend and the set of patterns it was given.
pub struct WatchOrchestrator {
    backend: Backend,
    entries: WatchEntrySet,
    next_id: u64,
}

impl Default for WatchOrchestrator {
    fn default() -> Self {
        Self {
            backend: Backend::None,
            entries: WatchEntrySet::new(),
            next_id: 0,
        }
    }
}

impl WatchOrchestrator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self.backend {
            Backend::ClientPush { .. } => BackendKind::ClientPush,
            Backend::Native(_) => BackendKind::Native,
            Backend::Polling(_) => BackendKind::Polling,
            Backend::None => BackendKind::None,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &WatchEntrySet {
        &self.entries
    }

    /// Pick a backend: the client when it can watch for us, otherwise native
    /// OS events or polling as `mode` allows.
    pub async fn start(
        &mut self,
        peer: &dyn Peer,
        client_push: bool,
        root: &Utf8Path,
        exclude: &ExcludeSet,
        mode: WatcherMode,
        tx: EventSender,
    ) {
        if client_push {
            self.backend = Backend::ClientPush {
                registrations: Vec::new(),
            };
            self.watch_patterns(peer, client_watch_patterns()).await;
            tracing::info!("using client file watching");
            return;
        }

        let native = || NativeWatcher::start(root, exclude.ignore_dirs(root), tx.clone());
        let polling = || PollingWatcher::start(root, exclude.ignore_dirs(root), tx.clone());

        self.backend = match mode {
            WatcherMode::Native => match native() {
                Ok(watcher) => Backend::Native(watcher),
                Err(err) => {
                    tracing::error!(error = %err, "native file watcher unavailable");
                    Backend::None
                }
            },
            WatcherMode::Polling => match polling() {
                Ok(watcher) => Backend::Polling(watcher),
                Err(err) => {
                    tracing::error!(error = %err, "polling file watcher unavailable");
                    Backend::None
                }
            },
            WatcherMode::Auto => match native() {
                Ok(watcher) => Backend::Native(watcher),
                Err(err) => {
                    tracing::warn!(error = %err, "native file watcher unavailable, polling instead");
                    match polling() {
                        Ok(watcher) => Backend::Polling(watcher),
                        Err(err) => {
                            tracing::error!(error = %err, "no file watcher available");
                            Backend::None
                        }
                    }
                }
            },
        };

        tracing::info!(backend = ?self.kind(), root = %root, "file watching started");
    }

    /// Ask the backend to also cover `patterns`. Patterns seen before are
    /// skipped.
    pub async fn watch_patterns(&mut self, peer: &dyn Peer, patterns: impl IntoIterator<Item = String>) {
        if matches!(self.backend, Backend::None) {
            return;
        }

        let new = self.entries.insert_new(patterns);
        if new.is_empty() {
            return;
        }

        match &mut self.backend {
            Backend::ClientPush { registrations } => {
                self.next_id += 1;
                let id = format!("twls-watch-{}", self.next_id);
                let options = DidChangeWatchedFilesRegistrationOptions {
                    watchers: new
                        .iter()
                        .map(|pattern| FileSystemWatcher {
                            glob_pattern: GlobPattern::String(pattern.clone()),
                            kind: None,
                        })
                        .collect(),
                };
                let registration = Registration {
                    id: id.clone(),
                    method: WATCHED_FILES_METHOD.to_string(),
                    register_options: serde_json::to_value(options).ok().filter(|v| !v.is_null()),
                };

                match peer.register_capability(vec![registration]).await {
                    Ok(()) => registrations.push(Unregistration {
                        id,
                        method: WATCHED_FILES_METHOD.to_string(),
                    }),
                    Err(err) => tracing::warn!(error = %err, "failed to register file watchers"),
                }
            }
            Backend::Polling(watcher) => {
                for pattern in &new {
                    let base = glob_base(pattern);
                    if !base.is_dir() {
                        continue;
                    }
                    if let Err(err) = watcher.add_directory(&base) {
                        tracing::warn!(dir = %base, error = %err, "failed to poll directory");
                    }
                }
            }
            // native watching already covers the whole workspace recursively
            Backend::Native(_) | Backend::None => {}
        }
    }

    /// Stop watching and forget every pattern.
    pub async fn dispose(&mut self, peer: &dyn Peer) {
        let backend = std::mem::replace(&mut self.backend, Backend::None);
        if let Backend::ClientPush { registrations } = backend {
            if !registrations.is_empty() {
                if let Err(err) = peer.unregister_capability(registrations).await {
                    tracing::warn!(error = %err, "failed to unregister file watchers");
                }
            }
        }
        self.entries.clear();
    }
}

/// Glob patterns inside a `workspace/didChangeWatchedFiles` registration.
#[must_use]
pub fn registered_globs(registration: &Registration) -> Vec<String> {
    registration
        .register_options
        .as_ref()
        .and_then(|options| options.get("watchers"))
        .and_then(Value::as_array)
        .map(|watchers| {
            watchers
                .iter()
                .filter_map(|watcher| watcher.get("globPattern").and_then(Value::as_str))
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

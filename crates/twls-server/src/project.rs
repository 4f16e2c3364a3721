//! The per-project runtime seam.
//!
//! The orchestration core never looks inside a project beyond what
//! [`ProjectRuntime`] exposes. Language features (hover text, completion
//! items, color parsing) live behind it; the core only routes to it.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use semver::Version;
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
use tower_lsp_server::lsp_types::Hover;
use tower_lsp_server::lsp_types::HoverParams;
use twls_conf::Settings;
use twls_project::ConfigLoader;
use twls_project::ProjectDescriptor;
use twls_project::Selector;
use twls_workspace::FileChangeEvent;

#[async_trait]
pub trait ProjectRuntime: Send + Sync {
    fn enabled(&self) -> bool;
    fn enable(&mut self);
    fn disable(&mut self);

    /// Load whatever the project needs to answer requests. Called when the
    /// project is first enabled; calling it again is a no-op.
    async fn try_init(&mut self) -> Result<()>;

    /// File changes that did not invalidate the project topology.
    async fn on_file_events(&mut self, events: &[FileChangeEvent]);
    async fn on_update_settings(&mut self, settings: &Settings);

    fn document_selector(&self) -> &[Selector];
    /// Variant separator, when the config overrides the default `:`.
    fn separator(&self) -> Option<char>;
    fn version(&self) -> &Version;

    async fn dispose(&mut self);

    async fn hover(&self, _params: HoverParams) -> Option<Hover> {
        None
    }

    async fn completion(&self, _params: CompletionParams) -> Option<CompletionResponse> {
        None
    }

    async fn resolve_completion(&self, item: CompletionItem) -> CompletionItem {
        item
    }

    async fn document_colors(&self, _params: DocumentColorParams) -> Vec<ColorInformation> {
        Vec::new()
    }

    async fn color_presentation(&self, _params: ColorPresentationParams) -> Vec<ColorPresentation> {
        Vec::new()
    }

    async fn code_actions(&self, _params: CodeActionParams) -> Option<CodeActionResponse> {
        None
    }

    async fn document_links(&self, _params: DocumentLinkParams) -> Option<Vec<DocumentLink>> {
        None
    }

    /// Sort each whitespace-separated class list.
    async fn sort_class_lists(&self, class_lists: Vec<String>) -> Result<Vec<String>>;
}

/// Builds the runtime for a freshly discovered project.
pub trait ProjectFactory: Send + Sync {
    fn create(&self, descriptor: &ProjectDescriptor, settings: &Settings) -> Box<dyn ProjectRuntime>;
}

/// Runtime used when no language engine is plugged in: it tracks lifecycle
/// state, reads the separator from the config, and sorts classes
/// lexicographically.
pub struct BasicProject {
    config_path: Option<Utf8PathBuf>,
    selectors: Vec<Selector>,
    version: Version,
    loader: Arc<dyn ConfigLoader>,
    enabled: bool,
    initialized: bool,
    separator: Option<char>,
}

impl BasicProject {
    #[must_use]
    pub fn new(descriptor: &ProjectDescriptor, loader: Arc<dyn ConfigLoader>) -> Self {
        Self {
            config_path: descriptor.config_path().map(camino::Utf8Path::to_path_buf),
            selectors: descriptor.selectors().to_vec(),
            version: descriptor.version().clone(),
            loader,
            enabled: false,
            initialized: false,
            separator: None,
        }
    }

    fn reload(&mut self) -> Result<()> {
        let Some(config) = &self.config_path else {
            return Ok(());
        };
        let content = self.loader.load(config)?;
        self.separator = content.separator;
        Ok(())
    }
}

#[async_trait]
impl ProjectRuntime for BasicProject {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    async fn try_init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.reload()?;
        self.initialized = true;
        tracing::debug!(config = ?self.config_path, "project initialized");
        Ok(())
    }

    async fn on_file_events(&mut self, events: &[FileChangeEvent]) {
        let touches_config = self
            .config_path
            .as_ref()
            .is_some_and(|config| events.iter().any(|event| &event.path == config));

        if self.initialized && touches_config {
            if let Err(err) = self.reload() {
                tracing::warn!(config = ?self.config_path, error = %err, "failed to reload config");
            }
        }
    }

    async fn on_update_settings(&mut self, _settings: &Settings) {}

    fn document_selector(&self) -> &[Selector] {
        &self.selectors
    }

    fn separator(&self) -> Option<char> {
        self.separator
    }

    fn version(&self) -> &Version {
        &self.version
    }

    async fn dispose(&mut self) {
        self.enabled = false;
        self.initialized = false;
    }

    async fn sort_class_lists(&self, class_lists: Vec<String>) -> Result<Vec<String>> {
        Ok(class_lists
            .into_iter()
            .map(|list| {
                let mut classes: Vec<&str> = list.split_whitespace().collect();
                classes.sort_unstable();
                classes.join(" ")
            })
            .collect())
    }
}

pub struct BasicProjectFactory {
    loader: Arc<dyn ConfigLoader>,
}

impl BasicProjectFactory {
    #[must_use]
    pub fn new(loader: Arc<dyn ConfigLoader>) -> Self {
        Self { loader }
    }
}

impl ProjectFactory for BasicProjectFactory {
    fn create(&self, descriptor: &ProjectDescriptor, _settings: &Settings) -> Box<dyn ProjectRuntime> {
        Box::new(BasicProject::new(descriptor, Arc::clone(&self.loader)))
    }
}

use std::sync::Arc;

use tower_lsp_server::jsonrpc::Result as LspResult;
use tower_lsp_server::lsp_types::CodeActionParams;
use tower_lsp_server::lsp_types::CodeActionResponse;
use tower_lsp_server::lsp_types::ColorInformation;
use tower_lsp_server::lsp_types::ColorPresentation;
use tower_lsp_server::lsp_types::ColorPresentationParams;
use tower_lsp_server::lsp_types::CompletionItem;
use tower_lsp_server::lsp_types::CompletionParams;
use tower_lsp_server::lsp_types::CompletionResponse;
use tower_lsp_server::lsp_types::DidChangeConfigurationParams;
use tower_lsp_server::lsp_types::DidChangeTextDocumentParams;
use tower_lsp_server::lsp_types::DidChangeWatchedFilesParams;
use tower_lsp_server::lsp_types::DidCloseTextDocumentParams;
use tower_lsp_server::lsp_types::DidOpenTextDocumentParams;
use tower_lsp_server::lsp_types::DocumentColorParams;
use tower_lsp_server::lsp_types::DocumentLink;
use tower_lsp_server::lsp_types::DocumentLinkParams;
use tower_lsp_server::lsp_types::Hover;
use tower_lsp_server::lsp_types::HoverParams;
use tower_lsp_server::lsp_types::InitializeParams;
use tower_lsp_server::lsp_types::InitializeResult;
use tower_lsp_server::lsp_types::InitializedParams;
use tower_lsp_server::lsp_types::ServerInfo;
use tower_lsp_server::Client;
use tower_lsp_server::LanguageServer;
use tracing_appender::non_blocking::WorkerGuard;

use crate::capabilities::server_capabilities;
use crate::capabilities::supports_dynamic_providers;
use crate::client::Peer;
use crate::client::TowerPeer;
use crate::ext::GetProjectParams;
use crate::ext::ProjectInfo;
use crate::ext::SortSelectionParams;
use crate::ext::SortSelectionResult;
use crate::host::Host;
use crate::host::Services;

const SERVER_NAME: &str = "Tailwind CSS Language Server";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct TailwindLanguageServer {
    host: Arc<Host>,
    _log_guard: Option<WorkerGuard>,
}

impl TailwindLanguageServer {
    #[must_use]
    pub fn new(client: Client, log_guard: Option<WorkerGuard>) -> Self {
        Self::with_peer(Arc::new(TowerPeer::new(client)), Services::default(), log_guard)
    }

    #[must_use]
    pub fn with_peer(peer: Arc<dyn Peer>, services: Services, log_guard: Option<WorkerGuard>) -> Self {
        Self {
            host: Host::new(peer, services),
            _log_guard: log_guard,
        }
    }

    #[must_use]
    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    pub async fn sort_selection(&self, params: SortSelectionParams) -> LspResult<SortSelectionResult> {
        Ok(self.host.sort_selection(&params.uri, params.class_lists).await)
    }

    pub async fn get_project(&self, params: GetProjectParams) -> LspResult<Option<ProjectInfo>> {
        Ok(self.host.get_project(&params.uri).await)
    }
}

impl LanguageServer for TailwindLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> LspResult<InitializeResult> {
        tracing::info!("Initializing server...");

        self.host.initialize(&params).await;
        let dynamic = supports_dynamic_providers(&params.capabilities);

        Ok(InitializeResult {
            capabilities: server_capabilities(dynamic),
            server_info: Some(ServerInfo {
                name: SERVER_NAME.to_string(),
                version: Some(SERVER_VERSION.to_string()),
            }),
            offset_encoding: None,
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        let host = Arc::clone(&self.host);
        tokio::spawn(async move {
            host.init().await;
        });
    }

    async fn shutdown(&self) -> LspResult<()> {
        self.host.shutdown().await;
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        tracing::debug!(uri = %params.text_document.uri.as_str(), "opened document");
        self.host
            .did_open(params.text_document.uri, params.text_document.version)
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        self.host
            .did_change(&params.text_document.uri, params.text_document.version)
            .await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.host.did_close(&params.text_document.uri).await;
    }

    async fn did_change_configuration(&self, _params: DidChangeConfigurationParams) {
        let host = Arc::clone(&self.host);
        tokio::spawn(async move {
            host.settings_changed().await;
        });
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        self.host.client_file_events(params.changes);
    }

    async fn hover(&self, params: HoverParams) -> LspResult<Option<Hover>> {
        Ok(self.host.hover(params).await)
    }

    async fn completion(&self, params: CompletionParams) -> LspResult<Option<CompletionResponse>> {
        Ok(self.host.completion(params).await)
    }

    async fn completion_resolve(&self, item: CompletionItem) -> LspResult<CompletionItem> {
        Ok(self.host.resolve_completion(item).await)
    }

    async fn document_color(&self, params: DocumentColorParams) -> LspResult<Vec<ColorInformation>> {
        Ok(self.host.document_colors(params).await)
    }

    async fn color_presentation(
        &self,
        params: ColorPresentationParams,
    ) -> LspResult<Vec<ColorPresentation>> {
        Ok(self.host.color_presentation(params).await)
    }

    async fn code_action(&self, params: CodeActionParams) -> LspResult<Option<CodeActionResponse>> {
        Ok(self.host.code_actions(params).await)
    }

    async fn document_link(&self, params: DocumentLinkParams) -> LspResult<Option<Vec<DocumentLink>>> {
        Ok(self.host.document_links(params).await)
    }
}

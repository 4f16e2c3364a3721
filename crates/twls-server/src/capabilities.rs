//! Provider registration, static or dynamic depending on the client.

use serde_json::json;
use tower_lsp_server::lsp_types::ClientCapabilities;
use tower_lsp_server::lsp_types::CodeActionProviderCapability;
use tower_lsp_server::lsp_types::ColorProviderCapability;
use tower_lsp_server::lsp_types::CompletionOptions;
use tower_lsp_server::lsp_types::DocumentLinkOptions;
use tower_lsp_server::lsp_types::HoverProviderCapability;
use tower_lsp_server::lsp_types::Registration;
use tower_lsp_server::lsp_types::ServerCapabilities;
use tower_lsp_server::lsp_types::TextDocumentSyncCapability;
use tower_lsp_server::lsp_types::TextDocumentSyncKind;
use tower_lsp_server::lsp_types::Unregistration;
use tower_lsp_server::lsp_types::WorkDoneProgressOptions;

use crate::client::Peer;

/// Characters that open a completion session regardless of project config.
pub const BASE_TRIGGER_CHARACTERS: [&str; 12] =
    ["\"", "'", "`", " ", ".", "(", "[", "]", "!", "/", "-", ":"];

/// Base triggers plus each project separator, deduplicated, in first-seen
/// order.
#[must_use]
pub fn trigger_characters(separators: impl IntoIterator<Item = char>) -> Vec<String> {
    let mut triggers: Vec<String> = BASE_TRIGGER_CHARACTERS.iter().map(ToString::to_string).collect();
    for separator in separators {
        let separator = separator.to_string();
        if !triggers.contains(&separator) {
            triggers.push(separator);
        }
    }
    triggers
}

/// Whether the client lets us register language providers at runtime.
#[must_use]
pub fn supports_dynamic_providers(capabilities: &ClientCapabilities) -> bool {
    capabilities
        .text_document
        .as_ref()
        .and_then(|text_document| text_document.completion.as_ref())
        .and_then(|completion| completion.dynamic_registration)
        .unwrap_or(false)
}

/// Whether the client watches files for us when asked.
#[must_use]
pub fn supports_dynamic_watchers(capabilities: &ClientCapabilities) -> bool {
    capabilities
        .workspace
        .as_ref()
        .and_then(|workspace| workspace.did_change_watched_files.as_ref())
        .and_then(|watched| watched.dynamic_registration)
        .unwrap_or(false)
}

/// Capabilities returned from `initialize`.
///
/// With dynamic registration the language providers are left out here and
/// registered once projects exist.
#[must_use]
pub fn server_capabilities(dynamic: bool) -> ServerCapabilities {
    let mut capabilities = ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
        ..ServerCapabilities::default()
    };

    if !dynamic {
        capabilities.hover_provider = Some(HoverProviderCapability::Simple(true));
        capabilities.color_provider = Some(ColorProviderCapability::Simple(true));
        capabilities.code_action_provider = Some(CodeActionProviderCapability::Simple(true));
        capabilities.document_link_provider = Some(DocumentLinkOptions {
            resolve_provider: Some(false),
            work_done_progress_options: WorkDoneProgressOptions::default(),
        });
        capabilities.completion_provider = Some(CompletionOptions {
            resolve_provider: Some(true),
            trigger_characters: Some(trigger_characters([])),
            ..CompletionOptions::default()
        });
    }

    capabilities
}

const PROVIDER_METHODS: [&str; 4] = [
    "textDocument/hover",
    "textDocument/documentColor",
    "textDocument/codeAction",
    "textDocument/documentLink",
];
const COMPLETION_METHOD: &str = "textDocument/completion";

/// Keeps at most one bulk provider registration alive.
#[derive(Debug)]
pub struct CapabilityController {
    dynamic: bool,
    registered: Option<Vec<Unregistration>>,
    next_id: u64,
}

impl CapabilityController {
    #[must_use]
    pub fn new(dynamic: bool) -> Self {
        Self {
            dynamic,
            registered: None,
            next_id: 0,
        }
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// The outstanding registration, if any.
    #[must_use]
    pub fn registered(&self) -> Option<&[Unregistration]> {
        self.registered.as_deref()
    }

    /// Replace the current registration with one using the triggers for
    /// `separators`.
    pub async fn refresh(&mut self, peer: &dyn Peer, separators: impl IntoIterator<Item = char>) {
        if !self.dynamic {
            return;
        }

        self.clear(peer).await;

        let triggers = trigger_characters(separators);
        let mut registrations: Vec<Registration> = PROVIDER_METHODS
            .iter()
            .map(|method| self.registration(method, json!({ "documentSelector": null })))
            .collect();
        registrations.push(self.registration(
            COMPLETION_METHOD,
            json!({
                "documentSelector": null,
                "resolveProvider": true,
                "triggerCharacters": triggers,
            }),
        ));

        let unregistrations = registrations
            .iter()
            .map(|registration| Unregistration {
                id: registration.id.clone(),
                method: registration.method.clone(),
            })
            .collect();

        match peer.register_capability(registrations).await {
            Ok(()) => self.registered = Some(unregistrations),
            Err(err) => tracing::warn!(error = %err, "failed to register capabilities"),
        }
    }

    /// Drop the outstanding registration, if there is one.
    pub async fn clear(&mut self, peer: &dyn Peer) {
        if let Some(unregistrations) = self.registered.take() {
            if let Err(err) = peer.unregister_capability(unregistrations).await {
                tracing::warn!(error = %err, "failed to unregister capabilities");
            }
        }
    }

    fn registration(&mut self, method: &str, options: serde_json::Value) -> Registration {
        self.next_id += 1;
        Registration {
            id: format!("twls-{}-{}", method.trim_start_matches("textDocument/"), self.next_id),
            method: method.to_string(),
            register_options: Some(options),
        }
    }
}

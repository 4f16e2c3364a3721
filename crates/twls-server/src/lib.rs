mod capabilities;
mod classify;
mod client;
mod ext;
mod host;
mod lifecycle;
mod logging;
mod project;
mod server;
mod session;
mod watch;

use anyhow::Result;
use tower_lsp_server::LspService;
use tower_lsp_server::Server;

pub use crate::capabilities::server_capabilities;
pub use crate::capabilities::trigger_characters;
pub use crate::capabilities::CapabilityController;
pub use crate::capabilities::BASE_TRIGGER_CHARACTERS;
pub use crate::classify::classify;
pub use crate::classify::ClassifyContext;
pub use crate::classify::Decision;
pub use crate::classify::RestartReason;
pub use crate::client::Peer;
pub use crate::client::SETTINGS_SECTION;
pub use crate::ext::GetProjectParams;
pub use crate::ext::ProjectInfo;
pub use crate::ext::ProjectsDestroyed;
pub use crate::ext::SortSelectionError;
pub use crate::ext::SortSelectionParams;
pub use crate::ext::SortSelectionResult;
pub use crate::ext::GET_PROJECT_METHOD;
pub use crate::ext::SORT_SELECTION_METHOD;
pub use crate::host::Host;
pub use crate::host::Services;
pub use crate::lifecycle::InitOutcome;
pub use crate::lifecycle::LifecycleState;
pub use crate::project::BasicProject;
pub use crate::project::BasicProjectFactory;
pub use crate::project::ProjectFactory;
pub use crate::project::ProjectRuntime;
pub use crate::server::TailwindLanguageServer;
pub use crate::session::Session;
pub use crate::watch::registered_globs;
pub use crate::watch::BackendKind;
pub use crate::watch::WatchOrchestrator;

/// Run the language server over stdio until the client disconnects.
/// `log_filter` is the file log's filter directive when `RUST_LOG` is unset.
pub async fn serve(log_filter: &str) -> Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::build(|client| {
        let runtime = tokio::runtime::Handle::current();
        let log_client = client.clone();
        // watcher threads log outside the runtime, so spawn through the handle
        let log_guard = logging::init_tracing(log_filter, move |message_type, message| {
            let client = log_client.clone();
            runtime.spawn(async move {
                client.log_message(message_type, message).await;
            });
        });

        TailwindLanguageServer::new(client, Some(log_guard))
    })
    .custom_method(SORT_SELECTION_METHOD, TailwindLanguageServer::sort_selection)
    .custom_method(GET_PROJECT_METHOD, TailwindLanguageServer::get_project)
    .finish();

    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}

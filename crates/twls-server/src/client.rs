use anyhow::anyhow;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tower_lsp_server::lsp_types;
use tower_lsp_server::lsp_types::ConfigurationItem;
use tower_lsp_server::lsp_types::Diagnostic;
use tower_lsp_server::lsp_types::Registration;
use tower_lsp_server::lsp_types::Unregistration;
use tower_lsp_server::Client;

use crate::ext::ProjectsDestroyed;

/// Settings section requested through `workspace/configuration`.
pub const SETTINGS_SECTION: &str = "tailwindCSS";

/// The parts of the editor the orchestration core talks back to.
///
/// Production code uses [`TowerPeer`]; tests substitute a recorder.
#[async_trait]
pub trait Peer: Send + Sync {
    async fn register_capability(&self, registrations: Vec<Registration>) -> Result<()>;
    async fn unregister_capability(&self, unregisterations: Vec<Unregistration>) -> Result<()>;
    /// The client's settings object for `scope`, or `null` if it has none.
    async fn configuration(&self, scope: Option<lsp_types::Uri>) -> Result<Value>;
    async fn publish_diagnostics(
        &self,
        uri: lsp_types::Uri,
        diagnostics: Vec<Diagnostic>,
        version: Option<i32>,
    );
    async fn projects_destroyed(&self);
}

pub struct TowerPeer {
    client: Client,
}

impl TowerPeer {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn rpc_error(err: &tower_lsp_server::jsonrpc::Error) -> anyhow::Error {
    anyhow!("{} ({:?})", err.message, err.code)
}

#[async_trait]
impl Peer for TowerPeer {
    async fn register_capability(&self, registrations: Vec<Registration>) -> Result<()> {
        self.client
            .register_capability(registrations)
            .await
            .map_err(|err| rpc_error(&err))
    }

    async fn unregister_capability(&self, unregisterations: Vec<Unregistration>) -> Result<()> {
        self.client
            .unregister_capability(unregisterations)
            .await
            .map_err(|err| rpc_error(&err))
    }

    async fn configuration(&self, scope: Option<lsp_types::Uri>) -> Result<Value> {
        let items = vec![ConfigurationItem {
            scope_uri: scope,
            section: Some(SETTINGS_SECTION.to_string()),
        }];
        let mut values = self
            .client
            .configuration(items)
            .await
            .map_err(|err| rpc_error(&err))?;
        Ok(values.pop().unwrap_or(Value::Null))
    }

    async fn publish_diagnostics(
        &self,
        uri: lsp_types::Uri,
        diagnostics: Vec<Diagnostic>,
        version: Option<i32>,
    ) {
        self.client.publish_diagnostics(uri, diagnostics, version).await;
    }

    async fn projects_destroyed(&self) {
        self.client.send_notification::<ProjectsDestroyed>(()).await;
    }
}

//! Custom protocol extensions under the `@/tailwindCSS/` namespace.

use serde::Deserialize;
use serde::Serialize;
use tower_lsp_server::lsp_types;
use tower_lsp_server::lsp_types::notification::Notification;

pub const SORT_SELECTION_METHOD: &str = "@/tailwindCSS/sortSelection";
pub const GET_PROJECT_METHOD: &str = "@/tailwindCSS/getProject";

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSelectionParams {
    pub uri: lsp_types::Uri,
    pub class_lists: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortSelectionError {
    /// No project owns the document.
    NoProject,
    /// The owning project failed to sort.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SortSelectionResult {
    Sorted {
        #[serde(rename = "classLists")]
        class_lists: Vec<String>,
    },
    Failed {
        error: SortSelectionError,
    },
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GetProjectParams {
    pub uri: lsp_types::Uri,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectInfo {
    pub version: String,
}

/// Sent once all projects have been torn down. Clients should drop any
/// per-project state they cached.
#[derive(Debug)]
pub enum ProjectsDestroyed {}

impl Notification for ProjectsDestroyed {
    type Params = ();
    const METHOD: &'static str = "@/tailwindCSS/projectsDestroyed";
}

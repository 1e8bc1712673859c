use cadpub_types::{Project, RevisionHash};
use serde::{Deserialize, Serialize};

/// What is known about a project's current revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub hash: RevisionHash,
    pub is_assembly: bool,
    pub has_drawings: bool,
}

/// A project together with its current metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStorage {
    pub project: Project,
    pub metadata: ProjectMetadata,
}

impl ProjectStorage {
    pub fn new(project: Project, metadata: ProjectMetadata) -> Self {
        Self { project, metadata }
    }
}

/// Descriptor of one project revision as sent to clients.
///
/// Links to artifacts that are not available are `null`, never `""`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDescriptor {
    pub id: String,
    pub label: String,
    pub hash: String,
    pub image: Option<String>,
    pub svf: Option<String>,
    pub model_download_url: Option<String>,
    pub obj_download_url: Option<String>,
    pub bom_download_url: Option<String>,
    pub bom_json_url: Option<String>,
    pub drawing_url: Option<String>,
    pub drawings_list_url: Option<String>,
    pub is_assembly: bool,
    pub has_drawing: bool,
    pub adopt_warnings: Vec<String>,
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// How a descriptor surfaces an artifact to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Surface {
    /// Rendered inline (data URI or local path) when cached, otherwise linked.
    Inline,
    /// Always a signed download link.
    Link,
    /// Parsed and embedded into the descriptor itself.
    Embedded,
}

/// The kinds of artifact stored per project revision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The uploaded CAD model itself.
    SourceModel,
    /// SVG thumbnail of the model.
    Thumbnail,
    /// Viewer-ready SVF bundle.
    Svf,
    /// Lightweight OBJ mesh export.
    Mesh,
    /// Bill of materials extract (CSV).
    Bom,
    /// Bill of materials as JSON, derived from [`ArtifactKind::Bom`].
    BomJson,
    /// Drawing sheets export.
    Drawing,
    /// Index of drawing sheets, derived from [`ArtifactKind::Drawing`].
    DrawingsList,
    /// Messages produced while adopting the source model.
    AdoptMessages,
}

impl ArtifactKind {
    /// Every kind, in declaration order.
    pub const ALL: [ArtifactKind; 9] = [
        Self::SourceModel,
        Self::Thumbnail,
        Self::Svf,
        Self::Mesh,
        Self::Bom,
        Self::BomJson,
        Self::Drawing,
        Self::DrawingsList,
        Self::AdoptMessages,
    ];

    /// Kinds produced by a derivative job (everything but the source model).
    pub fn derivatives() -> impl Iterator<Item = ArtifactKind> {
        Self::ALL.into_iter().filter(|k| k.is_derivative())
    }

    /// Stable snake_case name used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceModel => "source_model",
            Self::Thumbnail => "thumbnail",
            Self::Svf => "svf",
            Self::Mesh => "mesh",
            Self::Bom => "bom",
            Self::BomJson => "bom_json",
            Self::Drawing => "drawing",
            Self::DrawingsList => "drawings_list",
            Self::AdoptMessages => "adopt_messages",
        }
    }

    /// Returns `true` for kinds produced by a derivative job.
    pub fn is_derivative(&self) -> bool {
        !matches!(self, Self::SourceModel)
    }

    /// File name of the artifact inside its revision namespace.
    ///
    /// The source model has no file name: its key is the revision itself.
    pub fn file_name(&self) -> Option<&'static str> {
        match self {
            Self::SourceModel => None,
            Self::Thumbnail => Some("original-thumbnail.svg"),
            Self::Svf => Some("svf.zip"),
            Self::Mesh => Some("model.obj.zip"),
            Self::Bom => Some("bom.csv"),
            Self::BomJson => Some("bom.json"),
            Self::Drawing => Some("drawing.zip"),
            Self::DrawingsList => Some("drawings-list.json"),
            Self::AdoptMessages => Some("adopt-messages.json"),
        }
    }

    /// The kind stored under `file` inside a revision namespace.
    pub fn for_file_name(file: &str) -> Option<ArtifactKind> {
        Self::ALL.into_iter().find(|k| k.file_name() == Some(file))
    }

    /// Whether the engine output is packaged as a zip archive.
    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Svf | Self::Mesh | Self::Drawing)
    }

    /// MIME type of the stored artifact.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::SourceModel => "application/octet-stream",
            Self::Thumbnail => "image/svg+xml",
            Self::Svf | Self::Mesh | Self::Drawing => "application/zip",
            Self::Bom => "text/csv",
            Self::BomJson | Self::DrawingsList | Self::AdoptMessages => "application/json",
        }
    }

    /// How descriptors expose this kind.
    pub fn surface(&self) -> Surface {
        match self {
            Self::Thumbnail | Self::Svf | Self::DrawingsList => Surface::Inline,
            Self::AdoptMessages => Surface::Embedded,
            Self::SourceModel | Self::Mesh | Self::Bom | Self::BomJson | Self::Drawing => {
                Surface::Link
            }
        }
    }

    /// Kinds whose output this kind converts. An empty slice means the kind
    /// is converted straight from the source model.
    pub fn dependencies(&self) -> &'static [ArtifactKind] {
        match self {
            Self::BomJson => &[Self::Bom],
            Self::DrawingsList => &[Self::Drawing],
            _ => &[],
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| KeyError::UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_accepts_display_form() {
        for kind in ArtifactKind::ALL {
            assert_eq!(kind.to_string().parse::<ArtifactKind>().unwrap(), kind);
        }
        assert_eq!("BOM-JSON".parse::<ArtifactKind>().unwrap(), ArtifactKind::BomJson);
        assert!("stl".parse::<ArtifactKind>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ArtifactKind::DrawingsList).unwrap();
        assert_eq!(json, "\"drawings_list\"");
    }

    #[test]
    fn source_model_is_not_a_derivative() {
        assert!(!ArtifactKind::SourceModel.is_derivative());
        assert_eq!(ArtifactKind::derivatives().count(), 8);
        assert!(ArtifactKind::SourceModel.file_name().is_none());
    }

    #[test]
    fn file_names_are_distinct() {
        let mut names: Vec<_> = ArtifactKind::ALL.iter().filter_map(|k| k.file_name()).collect();
        let before = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), before);
    }

    #[test]
    fn dependency_edges() {
        assert_eq!(ArtifactKind::BomJson.dependencies(), &[ArtifactKind::Bom]);
        assert_eq!(ArtifactKind::DrawingsList.dependencies(), &[ArtifactKind::Drawing]);
        assert!(ArtifactKind::Mesh.dependencies().is_empty());
    }

    #[test]
    fn archives() {
        assert!(ArtifactKind::Mesh.is_archive());
        assert!(!ArtifactKind::Bom.is_archive());
    }
}

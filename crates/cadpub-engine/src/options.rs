use std::collections::BTreeMap;

use cadpub_types::ArtifactKind;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Length unit of exported geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    Millimeters,
    Centimeters,
    #[default]
    Meters,
    Inches,
    Feet,
}

/// Tessellation resolution of exported meshes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    Low,
    Medium,
    High,
}

/// Settings handed to the exporter with every submission.
///
/// The defaults match the lightweight mesh export: one output file,
/// internal facets removed, meters, low resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Write a single file instead of one file per component.
    pub one_file_output: bool,
    /// Drop facets that are not visible from outside the model.
    pub strip_internal_facets: bool,
    pub unit_system: UnitSystem,
    pub resolution: Resolution,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            one_file_output: true,
            strip_internal_facets: true,
            unit_system: UnitSystem::Meters,
            resolution: Resolution::Low,
        }
    }
}

/// Export options per artifact kind, validated once at startup.
///
/// Kinds without an entry use [`ExportOptions::default`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportTable {
    entries: BTreeMap<ArtifactKind, ExportOptions>,
}

impl ExportTable {
    /// An empty table: every kind uses the default options.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Set the options of one kind.
    pub fn with(mut self, kind: ArtifactKind, options: ExportOptions) -> Self {
        self.entries.insert(kind, options);
        self
    }

    /// Options submitted for `kind`.
    pub fn for_kind(&self, kind: ArtifactKind) -> ExportOptions {
        self.entries.get(&kind).copied().unwrap_or_default()
    }

    /// Kinds with explicit entries.
    pub fn kinds(&self) -> impl Iterator<Item = ArtifactKind> + '_ {
        self.entries.keys().copied()
    }

    /// Reject entries for kinds that are never exported.
    pub fn validate(&self) -> EngineResult<()> {
        match self.kinds().find(|k| !k.is_derivative()) {
            Some(kind) => Err(EngineError::InvalidOptions(format!(
                "{kind} is not produced by an export"
            ))),
            None => Ok(()),
        }
    }
}

impl Default for ExportTable {
    fn default() -> Self {
        Self::empty().with(ArtifactKind::Mesh, ExportOptions::default())
    }
}

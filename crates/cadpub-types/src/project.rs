use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KeyError, KeyResult};
use crate::keys::{self, CACHE_NAMESPACE, PROJECTS_NAMESPACE, SEPARATOR, THUMBNAIL_SUFFIX};
use crate::kind::ArtifactKind;
use crate::revision::RevisionHash;

/// Characters that may never appear in a project name.
const FORBIDDEN_CHARS: &[char] = &[SEPARATOR, '\\', '\0'];

/// Identity of one uploaded CAD project.
///
/// A project is a value object: it carries only its name and is compared by
/// it. All storage locations are derived from the name on demand.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Project {
    name: String,
}

impl Project {
    /// Create a project, validating the name.
    ///
    /// Fails with [`KeyError::InvalidArgument`] when the name is empty and
    /// with [`KeyError::InvalidKey`] when it cannot be embedded in a storage
    /// key unambiguously.
    pub fn new(name: impl Into<String>) -> KeyResult<Self> {
        let name = name.into();
        validate_project_name(&name)?;
        Ok(Self { name })
    }

    /// Reconstruct a project from any key produced by the naming scheme.
    pub fn from_object_key(key: &str) -> KeyResult<Self> {
        keys::parse_project(key)
    }

    /// The project name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unversioned upload slot for the project's source model.
    pub fn source_storage_key(&self) -> String {
        format!("{PROJECTS_NAMESPACE}{}", self.name)
    }

    /// Project-level thumbnail key (latest revision's thumbnail).
    pub fn thumbnail_storage_key(&self) -> String {
        format!("{CACHE_NAMESPACE}{}{THUMBNAIL_SUFFIX}", self.name)
    }

    /// Storage key of one artifact of one revision.
    pub fn key(&self, hash: &RevisionHash, kind: ArtifactKind) -> String {
        keys::derive_key(self, hash, kind)
    }

    /// Label shown to users.
    ///
    /// Names without a single character in `'0'..='z'` are prefixed with an
    /// underscore so clients never sort or render them as blank.
    pub fn label(&self) -> String {
        if self.name.chars().any(|c| ('0'..='z').contains(&c)) {
            self.name.clone()
        } else {
            format!("_{}", self.name)
        }
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl TryFrom<String> for Project {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Project> for String {
    fn from(project: Project) -> Self {
        project.name
    }
}

/// Validate a project name against the naming scheme.
pub fn validate_project_name(name: &str) -> KeyResult<()> {
    if name.is_empty() {
        return Err(KeyError::InvalidArgument(
            "project name must not be empty".into(),
        ));
    }

    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(KeyError::invalid_key(
                name,
                format!("project name contains forbidden character: {ch:?}"),
            ));
        }
    }

    if name.chars().any(char::is_control) {
        return Err(KeyError::invalid_key(
            name,
            "project name contains control characters",
        ));
    }

    if name == "." || name == ".." {
        return Err(KeyError::invalid_key(name, "project name must not be '.' or '..'"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_is_invalid_argument() {
        let err = Project::new("").unwrap_err();
        assert!(matches!(err, KeyError::InvalidArgument(_)));
    }

    #[test]
    fn separator_in_name_is_invalid_key() {
        let err = Project::new("wheel/hub").unwrap_err();
        assert!(matches!(err, KeyError::InvalidKey { .. }));
    }

    #[test]
    fn dot_names_are_rejected() {
        assert!(Project::new(".").is_err());
        assert!(Project::new("..").is_err());
        assert!(Project::new("...").is_ok());
    }

    #[test]
    fn control_characters_are_rejected() {
        assert!(Project::new("a\nb").is_err());
        assert!(Project::new("tab\there").is_err());
    }

    #[test]
    fn dashes_and_spaces_are_allowed() {
        let p = Project::new("my bike-frame v2").unwrap();
        assert_eq!(p.name(), "my bike-frame v2");
    }

    #[test]
    fn project_level_keys() {
        let p = Project::new("Wrench").unwrap();
        assert_eq!(p.source_storage_key(), "projects-Wrench");
        assert_eq!(p.thumbnail_storage_key(), "cache-Wrench-original-thumbnail.svg");
    }

    #[test]
    fn from_object_key_roundtrip() {
        let p = Project::new("Wrench").unwrap();
        assert_eq!(Project::from_object_key(&p.source_storage_key()).unwrap(), p);
        assert_eq!(Project::from_object_key(&p.thumbnail_storage_key()).unwrap(), p);
    }

    #[test]
    fn label_prefixes_names_outside_ascii_range() {
        assert_eq!(Project::new("Wrench").unwrap().label(), "Wrench");
        assert_eq!(Project::new("~~~").unwrap().label(), "_~~~");
        assert_eq!(Project::new("車輪").unwrap().label(), "_車輪");
        assert_eq!(Project::new("車輪2").unwrap().label(), "車輪2");
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let p: Project = serde_json::from_str("\"Wrench\"").unwrap();
        assert_eq!(p.name(), "Wrench");
        assert!(serde_json::from_str::<Project>("\"\"").is_err());
    }
}

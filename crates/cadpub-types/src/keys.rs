//! Storage key naming scheme.
//!
//! Every artifact lives under a key derived from (project, hash, kind):
//!
//! ```text
//! projects-<name>/<hash>                       source model of a revision
//! cache-<name>/<hash>/<kind file name>         derivatives of a revision
//! projects-<name>                              unversioned upload slot
//! cache-<name>-original-thumbnail.svg          project-level thumbnail
//! staging-<token>/<final key>                  in-flight uploads
//! ```
//!
//! Names and hashes never contain [`SEPARATOR`], so splitting a key on it is
//! unambiguous and the mapping is injective. Local cache paths reuse the
//! key's segments beneath the cache root.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{KeyError, KeyResult};
use crate::kind::ArtifactKind;
use crate::project::Project;
use crate::revision::RevisionHash;

/// Separator between key segments.
pub const SEPARATOR: char = '/';

/// Namespace of source models.
pub const PROJECTS_NAMESPACE: &str = "projects-";

/// Namespace of derivatives.
pub const CACHE_NAMESPACE: &str = "cache-";

/// Namespace of staged, not yet finalized uploads.
pub const STAGING_NAMESPACE: &str = "staging-";

/// Suffix of the project-level thumbnail key.
pub const THUMBNAIL_SUFFIX: &str = "-original-thumbnail.svg";

/// Derive the storage key of one artifact of one revision.
///
/// # Examples
///
/// ```
/// use cadpub_types::{derive_key, ArtifactKind, Project, RevisionHash};
///
/// let project = Project::new("Wrench").unwrap();
/// let hash = RevisionHash::new("a1b2").unwrap();
/// assert_eq!(derive_key(&project, &hash, ArtifactKind::SourceModel), "projects-Wrench/a1b2");
/// assert_eq!(derive_key(&project, &hash, ArtifactKind::Bom), "cache-Wrench/a1b2/bom.csv");
/// ```
pub fn derive_key(project: &Project, hash: &RevisionHash, kind: ArtifactKind) -> String {
    match kind.file_name() {
        None => format!("{PROJECTS_NAMESPACE}{}{SEPARATOR}{hash}", project.name()),
        Some(file) => format!(
            "{CACHE_NAMESPACE}{}{SEPARATOR}{hash}{SEPARATOR}{file}",
            project.name()
        ),
    }
}

/// Recover the project from any key produced by the scheme.
///
/// Fails with [`KeyError::InvalidKey`] when the key lacks a known namespace
/// prefix or does not match one of the key templates.
pub fn parse_project(key: &str) -> KeyResult<Project> {
    if let Some(rest) = key.strip_prefix(PROJECTS_NAMESPACE) {
        let segments: Vec<&str> = rest.split(SEPARATOR).collect();
        return match segments.as_slice() {
            [name] => project_from_segment(key, name),
            [name, hash] => {
                RevisionHash::new(*hash).map_err(|_| KeyError::invalid_key(key, "bad revision segment"))?;
                project_from_segment(key, name)
            }
            _ => Err(KeyError::invalid_key(key, "unexpected number of segments")),
        };
    }

    if let Some(rest) = key.strip_prefix(CACHE_NAMESPACE) {
        let segments: Vec<&str> = rest.split(SEPARATOR).collect();
        return match segments.as_slice() {
            [single] => match single.strip_suffix(THUMBNAIL_SUFFIX) {
                Some(name) => project_from_segment(key, name),
                None => Err(KeyError::invalid_key(key, "unknown project-level artifact")),
            },
            [name, hash, file] => {
                RevisionHash::new(*hash).map_err(|_| KeyError::invalid_key(key, "bad revision segment"))?;
                ArtifactKind::for_file_name(file)
                    .ok_or_else(|| KeyError::invalid_key(key, format!("unknown artifact file {file:?}")))?;
                project_from_segment(key, name)
            }
            _ => Err(KeyError::invalid_key(key, "unexpected number of segments")),
        };
    }

    Err(KeyError::invalid_key(key, "missing namespace prefix"))
}

/// Map a key to a path relative to a local cache root.
///
/// Rejects keys whose segments could escape the root.
pub fn local_path(key: &str) -> KeyResult<PathBuf> {
    if key.is_empty() {
        return Err(KeyError::invalid_key(key, "key must not be empty"));
    }
    let mut path = PathBuf::new();
    for segment in key.split(SEPARATOR) {
        if segment.is_empty() {
            return Err(KeyError::invalid_key(key, "empty path segment"));
        }
        if segment == "." || segment == ".." {
            return Err(KeyError::invalid_key(key, "relative path segment"));
        }
        if segment.contains('\\') || segment.chars().any(char::is_control) {
            return Err(KeyError::invalid_key(key, "unsafe characters in segment"));
        }
        path.push(segment);
    }
    Ok(path)
}

/// Staging key under which an upload is written before being finalized.
pub fn staging_key(key: &str, token: &str) -> String {
    format!("{STAGING_NAMESPACE}{token}{SEPARATOR}{key}")
}

/// Returns `true` for keys in the staging namespace.
pub fn is_staging_key(key: &str) -> bool {
    key.starts_with(STAGING_NAMESPACE)
}

fn project_from_segment(key: &str, name: &str) -> KeyResult<Project> {
    Project::new(name).map_err(|e| KeyError::invalid_key(key, e.to_string()))
}

/// A derivative that has been finalized in object storage.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub project: Project,
    pub hash: RevisionHash,
    pub kind: ArtifactKind,
    pub key: String,
}

impl StoredArtifact {
    /// Resolve the key of (project, hash, kind).
    pub fn new(project: Project, hash: RevisionHash, kind: ArtifactKind) -> Self {
        let key = derive_key(&project, &hash, kind);
        Self {
            project,
            hash,
            kind,
            key,
        }
    }
}

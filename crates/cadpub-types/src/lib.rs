//! Foundation types for cadpub.
//!
//! Every artifact derived from an uploaded CAD model is addressed by the
//! triple (project, revision hash, artifact kind). This crate owns that
//! triple and the pure key-naming scheme that maps it to object-storage keys
//! and local cache paths. Nothing here performs I/O.
//!
//! # Key Types
//!
//! - [`Project`]: validated project identity
//! - [`RevisionHash`]: content hash naming one revision of a project
//! - [`ArtifactKind`]: the kinds of derivative produced per revision
//! - [`StoredArtifact`]: a resolved (project, hash, kind) → key mapping
//! - [`keys`]: `derive_key`, `parse_project`, `local_path`, `staging_key`

pub mod error;
pub mod keys;
pub mod kind;
pub mod project;
pub mod revision;

pub use error::{KeyError, KeyResult};
pub use keys::{derive_key, local_path, parse_project, staging_key, StoredArtifact};
pub use kind::{ArtifactKind, Surface};
pub use project::Project;
pub use revision::RevisionHash;

//! High-level SDK for cadpub.
//!
//! Wires the key scheme, object store, local cache, conversion engines,
//! publishing pipeline and descriptor assembly into one
//! [`DerivativeService`], configured by a single TOML [`Settings`] file.
//! This is the main entry point for applications embedding cadpub.

pub mod error;
pub mod service;
pub mod settings;

pub use error::{SdkError, SdkResult};
pub use service::{storage_for, DerivativeService};
pub use settings::Settings;

// Re-export key types
pub use cadpub_cache::{CacheConfig, LocalArtifactCache};
pub use cadpub_descriptor::{LinkContext, ProjectDescriptor, ProjectMetadata, ProjectStorage, SchemeMapping};
pub use cadpub_engine::{ConversionEngine, EngineRegistry, ExportOptions, ScriptedEngine};
pub use cadpub_pipeline::{FailureClass, JobFailure, PipelineConfig, RevisionResult};
pub use cadpub_store::{FsObjectStore, InMemoryObjectStore, ObjectStore, UrlSigner};
pub use cadpub_types::{ArtifactKind, Project, RevisionHash, StoredArtifact};

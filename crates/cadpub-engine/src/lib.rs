//! Remote conversion engine boundary for cadpub.
//!
//! Heavy CAD conversions run on a remote, asynchronous model-processing
//! engine. This crate models that engine as an opaque capability:
//! submit a document with export options, poll until terminal, fetch the
//! output. Nothing here knows how a conversion is performed.
//!
//! - [`ConversionEngine`] -- the submit/poll/fetch/cancel interface
//! - [`EngineRegistry`] -- engines injected at startup, resolved per
//!   [`ArtifactKind`](cadpub_types::ArtifactKind) by declared capability
//! - [`ExportOptions`] / [`ExportTable`] -- typed per-kind export settings
//! - [`ScriptedEngine`] -- deterministic in-memory engine for tests

pub mod engine;
pub mod error;
pub mod options;
pub mod registry;
pub mod scripted;

pub use engine::{ConversionEngine, DocumentRef, EngineJobId, FailureReason, JobStatus, OutputRef};
pub use error::{EngineError, EngineResult};
pub use options::{ExportOptions, ExportTable, Resolution, UnitSystem};
pub use registry::EngineRegistry;
pub use scripted::{EngineEvent, Script, ScriptedEngine, Submission};

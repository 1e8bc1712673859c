//! Derivative generation and publishing for cadpub.
//!
//! A revision is published in three steps:
//!
//! 1. **Plan** ([`PublishPlan`]): the requested kinds plus everything they
//!    are converted from, ordered so producers come before consumers.
//! 2. **Jobs** ([`DerivativeJob`]): one remote conversion per kind, driven
//!    `Pending -> Submitted -> Running -> Succeeded | Failed`, whose output
//!    is uploaded all-or-nothing under its derived key and written through
//!    to the local cache.
//! 3. **Coordination** ([`PublishingCoordinator`]): bounded fan-out,
//!    dependency sequencing, transient retries, revision-wide cancellation
//!    and the final [`RevisionResult`].

pub mod config;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod plan;

pub use config::PipelineConfig;
pub use coordinator::{PublishingCoordinator, RevisionResult};
pub use error::{FailureClass, JobFailure, PipelineError, PipelineResult};
pub use job::{classify, DerivativeJob, JobContext, JobHandle, JobState};
pub use plan::PublishPlan;

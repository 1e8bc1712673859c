//! Client-facing project descriptors for cadpub.
//!
//! A descriptor is rebuilt per request from three sources: the local cache
//! (small assets inlined as data URIs), object storage (existence checks and
//! signed download links) and an explicit [`LinkContext`].
//!
//! ```text
//! ProjectStorage + hash --> DescriptorAssembler --> ProjectDescriptor (JSON)
//!                              |        |
//!                      LocalArtifactCache  ObjectStore
//! ```

pub mod assembler;
pub mod dto;
pub mod error;
pub mod links;
pub mod messages;

pub use assembler::DescriptorAssembler;
pub use dto::{ProjectDescriptor, ProjectMetadata, ProjectStorage};
pub use error::{DescriptorError, DescriptorResult};
pub use links::{LinkContext, SchemeMapping};
pub use messages::{warning_texts, AdoptionMessage, Severity};

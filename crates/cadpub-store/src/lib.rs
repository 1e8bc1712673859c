//! Object storage boundary for cadpub.
//!
//! Derivatives are published into a bucket addressed purely by keys from
//! [`cadpub_types::keys`]. The bucket itself is an external collaborator;
//! this crate defines the interface the pipeline consumes and two adapters.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsObjectStore`] -- objects as files beneath `<root>/<bucket>/`
//!
//! # Design Rules
//!
//! 1. Keys are opaque strings produced by the naming scheme; a new revision
//!    hash means a new key, so writes across revisions never contend.
//! 2. Uploads are all-or-nothing: stage under a staging key, then rename.
//! 3. Signed URLs are time-limited and verifiable with the issuing
//!    [`UrlSigner`].
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod memory;
pub mod signer;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use signer::UrlSigner;
pub use traits::{ensure_key_safe, ObjectStore};

//! Local artifact cache for cadpub.
//!
//! The cache materializes published artifacts on local disk so descriptors
//! can inline small assets instead of sending clients on a round trip to
//! object storage. It is a pure accelerator: every entry is written through
//! after the remote upload succeeded, and a missing entry is re-derived from
//! the remote object on the next access.
//!
//! Entries live at `<root>/<key segments>` (see
//! [`cadpub_types::keys::local_path`]). Writes are atomic (temporary file in
//! the target directory, fsync, rename) and serialized per key.

pub mod cache;
pub mod config;
pub mod entry;
pub mod error;

pub use cache::LocalArtifactCache;
pub use config::CacheConfig;
pub use entry::CachedEntry;
pub use error::{CacheError, CacheResult};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the local artifact cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding cached artifacts.
    pub root: PathBuf,
    /// Entries up to this size are inlined as `data:` URIs.
    pub inline_limit_bytes: u64,
    /// URL path prefix under which the cache root is served to clients.
    pub virtual_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/cache"),
            inline_limit_bytes: 64 * 1024,
            virtual_prefix: "/data".into(),
        }
    }
}

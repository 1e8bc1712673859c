use std::sync::Arc;

use cadpub_types::ArtifactKind;
use tracing::debug;

use crate::engine::ConversionEngine;
use crate::error::{EngineError, EngineResult};

/// Conversion engines available to the pipeline.
///
/// Engines are registered once at startup. A kind resolves to the first
/// registered engine declaring it as a capability.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: Vec<Arc<dyn ConversionEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an engine. Earlier registrations take precedence.
    pub fn register(&mut self, engine: Arc<dyn ConversionEngine>) {
        debug!(engine = engine.name(), capabilities = ?engine.capabilities(), "engine registered");
        self.engines.push(engine);
    }

    /// Builder form of [`EngineRegistry::register`].
    pub fn with(mut self, engine: Arc<dyn ConversionEngine>) -> Self {
        self.register(engine);
        self
    }

    /// The engine producing `kind`, if any.
    pub fn resolve(&self, kind: ArtifactKind) -> Option<Arc<dyn ConversionEngine>> {
        self.engines.iter().find(|e| e.supports(kind)).cloned()
    }

    /// Fail with [`EngineError::NoCapableEngine`] for the first kind no
    /// engine can produce.
    pub fn ensure_covers(&self, kinds: impl IntoIterator<Item = ArtifactKind>) -> EngineResult<()> {
        for kind in kinds {
            if self.resolve(kind).is_none() {
                return Err(EngineError::NoCapableEngine(kind));
            }
        }
        Ok(())
    }

    /// Names of the registered engines, in precedence order.
    pub fn names(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.names())
            .finish()
    }
}

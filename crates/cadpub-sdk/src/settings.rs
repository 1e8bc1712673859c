use std::path::Path;

use cadpub_cache::CacheConfig;
use cadpub_descriptor::LinkContext;
use cadpub_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Complete cadpub configuration. Every section is optional in TOML.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheConfig,
    pub pipeline: PipelineConfig,
    pub links: LinkContext,
}

impl Settings {
    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a settings file.
    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> SdkResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate every section. Run once at startup.
    pub fn validate(&self) -> SdkResult<()> {
        if !self.cache.virtual_prefix.starts_with('/') {
            return Err(SdkError::Settings(format!(
                "cache.virtual_prefix must start with '/', got {:?}",
                self.cache.virtual_prefix
            )));
        }
        self.pipeline.validate()?;
        self.links.validate()?;
        Ok(())
    }
}

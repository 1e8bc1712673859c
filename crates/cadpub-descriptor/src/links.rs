use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DescriptorError, DescriptorResult};

/// Replaces the scheme of a download link so a client app can claim it,
/// e.g. `https://...` becomes `myapp://...`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeMapping {
    pub from: String,
    pub to: String,
}

impl SchemeMapping {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> DescriptorResult<Self> {
        let mapping = Self {
            from: from.into(),
            to: to.into(),
        };
        mapping.validate()?;
        Ok(mapping)
    }

    /// Both sides must be valid URL schemes.
    pub fn validate(&self) -> DescriptorResult<()> {
        for scheme in [&self.from, &self.to] {
            if !is_valid_scheme(scheme) {
                return Err(DescriptorError::Link(format!("invalid URL scheme {scheme:?}")));
            }
        }
        Ok(())
    }

    /// Swap the scheme of `url`. URLs with another scheme pass unchanged.
    ///
    /// Both the input and the produced URL must parse.
    pub fn apply(&self, url: &str) -> DescriptorResult<String> {
        let parsed = Url::parse(url).map_err(|e| DescriptorError::Link(format!("{url}: {e}")))?;
        if !parsed.scheme().eq_ignore_ascii_case(&self.from) {
            return Ok(parsed.into());
        }
        let rest = &parsed.as_str()[parsed.scheme().len()..];
        let mapped = format!("{}{rest}", self.to);
        Url::parse(&mapped)
            .map(String::from)
            .map_err(|e| DescriptorError::Link(format!("{mapped}: {e}")))
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Host and link settings used while assembling descriptors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkContext {
    /// Base URL local asset paths are resolved against. Paths stay relative
    /// when unset.
    pub host: Option<String>,
    /// Lifetime of signed download links.
    pub signed_url_ttl_secs: u64,
    /// Scheme swap applied to the mesh download link.
    pub deep_link: Option<SchemeMapping>,
}

impl Default for LinkContext {
    fn default() -> Self {
        Self {
            host: None,
            signed_url_ttl_secs: 3600,
            deep_link: None,
        }
    }
}

impl LinkContext {
    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }

    /// Check the settings once, before any descriptor is built.
    pub fn validate(&self) -> DescriptorResult<()> {
        if self.signed_url_ttl_secs == 0 {
            return Err(DescriptorError::Link("signed_url_ttl_secs must be positive".into()));
        }
        if let Some(host) = &self.host {
            let url = Url::parse(host).map_err(|e| DescriptorError::Link(format!("host {host}: {e}")))?;
            if url.cannot_be_a_base() {
                return Err(DescriptorError::Link(format!("host {host} cannot be a base URL")));
            }
        }
        if let Some(mapping) = &self.deep_link {
            mapping.validate()?;
        }
        Ok(())
    }

    /// Resolve a server-relative path (such as a cache virtual path) against
    /// the host. `data:` URIs and absolute URLs are returned unchanged.
    pub fn resolve(&self, reference: &str) -> DescriptorResult<String> {
        let Some(host) = &self.host else {
            return Ok(reference.to_string());
        };
        if Url::parse(reference).is_ok() {
            return Ok(reference.to_string());
        }
        let base = Url::parse(host).map_err(|e| DescriptorError::Link(format!("host {host}: {e}")))?;
        base.join(reference)
            .map(String::from)
            .map_err(|e| DescriptorError::Link(format!("{reference}: {e}")))
    }

    /// Apply the deep-link mapping, if configured.
    pub fn deep_link(&self, url: &str) -> DescriptorResult<String> {
        match &self.deep_link {
            Some(mapping) => mapping.apply(url),
            None => Ok(url.to_string()),
        }
    }
}

use std::collections::BTreeSet;
use std::time::Duration;

use cadpub_engine::ExportTable;
use cadpub_types::ArtifactKind;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Upper bound for a single retry delay.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Configuration of derivative jobs and revision publishing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Deadline of one job attempt, from submission to finalized upload.
    pub job_timeout_secs: u64,
    /// Delay between two polls of a running remote job.
    pub poll_interval_ms: u64,
    /// Maximum number of jobs in flight at once, across a revision.
    pub max_concurrent_jobs: usize,
    /// Retries granted to a kind after a transient failure.
    pub transient_retry_limit: u32,
    /// Base delay before the first retry; doubles on every further retry.
    pub retry_backoff_ms: u64,
    /// Kinds that must succeed for a revision to be ready.
    pub mandatory_kinds: BTreeSet<ArtifactKind>,
    /// Lifetime of the signed URL the engine downloads its input from.
    pub source_url_ttl_secs: u64,
    /// Export options per kind.
    pub export: ExportTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: 600,
            poll_interval_ms: 2000,
            max_concurrent_jobs: 4,
            transient_retry_limit: 3,
            retry_backoff_ms: 500,
            mandatory_kinds: BTreeSet::from([ArtifactKind::Mesh, ArtifactKind::Bom]),
            source_url_ttl_secs: 3600,
            export: ExportTable::default(),
        }
    }
}

impl PipelineConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn source_url_ttl(&self) -> Duration {
        Duration::from_secs(self.source_url_ttl_secs)
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`,
    /// capped at one minute.
    pub fn retry_backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor)).min(MAX_BACKOFF)
    }

    /// Whether `kind` must succeed for a revision to be ready.
    pub fn is_mandatory(&self, kind: ArtifactKind) -> bool {
        self.mandatory_kinds.contains(&kind)
    }

    /// Check the configuration once, before any job runs.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.job_timeout_secs == 0 {
            return Err(PipelineError::Config("job_timeout_secs must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(PipelineError::Config("poll_interval_ms must be positive".into()));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(PipelineError::Config("max_concurrent_jobs must be positive".into()));
        }
        if self.source_url_ttl_secs == 0 {
            return Err(PipelineError::Config("source_url_ttl_secs must be positive".into()));
        }
        if let Some(kind) = self.mandatory_kinds.iter().find(|k| !k.is_derivative()) {
            return Err(PipelineError::Config(format!(
                "mandatory kind {kind} is not a derivative"
            )));
        }
        self.export
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = PipelineConfig::default();
        c.validate().unwrap();
        assert!(c.is_mandatory(ArtifactKind::Mesh));
        assert!(c.is_mandatory(ArtifactKind::Bom));
        assert!(!c.is_mandatory(ArtifactKind::Drawing));
        assert_eq!(c.job_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let c = PipelineConfig {
            retry_backoff_ms: 500,
            ..Default::default()
        };
        assert_eq!(c.retry_backoff(1), Duration::from_millis(500));
        assert_eq!(c.retry_backoff(2), Duration::from_millis(1000));
        assert_eq!(c.retry_backoff(3), Duration::from_millis(2000));
        assert_eq!(c.retry_backoff(40), MAX_BACKOFF);
    }

    #[test]
    fn rejects_zero_limits() {
        let c = PipelineConfig {
            max_concurrent_jobs: 0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn rejects_source_model_as_mandatory() {
        let c = PipelineConfig {
            mandatory_kinds: BTreeSet::from([ArtifactKind::SourceModel]),
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let c: PipelineConfig = toml::from_str(
            r#"
            max_concurrent_jobs = 2
            mandatory_kinds = ["mesh"]

            [export.mesh]
            resolution = "high"
            "#,
        )
        .unwrap();
        assert_eq!(c.max_concurrent_jobs, 2);
        assert_eq!(c.mandatory_kinds, BTreeSet::from([ArtifactKind::Mesh]));
        assert_eq!(c.poll_interval_ms, 2000);
        assert_eq!(
            c.export.for_kind(ArtifactKind::Mesh).resolution,
            cadpub_engine::Resolution::High
        );
    }
}

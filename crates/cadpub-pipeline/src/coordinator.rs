use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use cadpub_cache::LocalArtifactCache;
use cadpub_engine::EngineRegistry;
use cadpub_store::ObjectStore;
use cadpub_types::{ArtifactKind, Project, RevisionHash, StoredArtifact};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{FailureClass, JobFailure, PipelineError, PipelineResult};
use crate::job::{DerivativeJob, JobContext};
use crate::plan::PublishPlan;

type KindOutcome = Result<StoredArtifact, JobFailure>;
type KindFuture = Shared<BoxFuture<'static, KindOutcome>>;

/// Outcome of publishing one revision.
#[derive(Clone, Debug, Serialize)]
pub struct RevisionResult {
    pub project: Project,
    pub hash: RevisionHash,
    pub succeeded: BTreeMap<ArtifactKind, StoredArtifact>,
    pub failed: BTreeMap<ArtifactKind, JobFailure>,
    /// Every mandatory kind is published for this revision.
    pub ready: bool,
}

impl RevisionResult {
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Option<&StoredArtifact> {
        self.succeeded.get(&kind)
    }

    pub fn failure(&self, kind: ArtifactKind) -> Option<&JobFailure> {
        self.failed.get(&kind)
    }

    /// Turn a result that is not ready into [`PipelineError::RevisionFailed`].
    pub fn ensure_ready(self) -> PipelineResult<Self> {
        if self.ready {
            return Ok(self);
        }
        Err(PipelineError::RevisionFailed {
            project: self.project,
            hash: self.hash,
            failures: self.failed.into_values().collect(),
        })
    }
}

/// Publishes revisions: uploads the source model, then runs one
/// [`DerivativeJob`] per planned kind.
///
/// Jobs of one revision run concurrently, bounded by `max_concurrent_jobs`
/// permits shared by every revision this coordinator publishes. A kind
/// starts only after all kinds it is converted from succeeded.
pub struct PublishingCoordinator {
    ctx: JobContext,
    permits: Arc<Semaphore>,
}

impl PublishingCoordinator {
    /// Build a coordinator. The configuration is validated here, once.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cache: Arc<LocalArtifactCache>,
        engines: EngineRegistry,
        config: PipelineConfig,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Ok(Self {
            ctx: JobContext {
                store,
                cache,
                engines: Arc::new(engines),
                config: Arc::new(config),
            },
            permits,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.ctx.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.ctx.store
    }

    pub fn engines(&self) -> &EngineRegistry {
        &self.ctx.engines
    }

    /// Publish `kinds` of a revision whose source model is `source`.
    pub async fn publish(
        &self,
        project: &Project,
        hash: &RevisionHash,
        source: Bytes,
        kinds: impl IntoIterator<Item = ArtifactKind>,
    ) -> PipelineResult<RevisionResult> {
        self.publish_with_cancel(project, hash, source, kinds, &CancellationToken::new())
            .await
    }

    /// Like [`PublishingCoordinator::publish`], stopping every job of the
    /// revision once `cancel` fires. Cancelled jobs finalize nothing.
    ///
    /// Per-kind failures are reported in the result; only planning and
    /// source upload errors fail the call itself.
    pub async fn publish_with_cancel(
        &self,
        project: &Project,
        hash: &RevisionHash,
        source: Bytes,
        kinds: impl IntoIterator<Item = ArtifactKind>,
        cancel: &CancellationToken,
    ) -> PipelineResult<RevisionResult> {
        let plan = PublishPlan::build(kinds)?;
        info!(project = %project, hash = %hash, kinds = ?plan.order(), "publishing revision");

        let source_key = project.key(hash, ArtifactKind::SourceModel);
        if self.ctx.store.exists(&source_key).await? {
            debug!(key = %source_key, "source model already uploaded");
        } else {
            self.ctx.store.put_staged(&source_key, source).await?;
        }

        let revision = RevisionRun {
            ctx: self.ctx.clone(),
            permits: Arc::clone(&self.permits),
            project: project.clone(),
            hash: hash.clone(),
            source_key,
            cancel: cancel.clone(),
        };

        let mut tasks: BTreeMap<ArtifactKind, KindFuture> = BTreeMap::new();
        for &kind in plan.order() {
            let producers: Vec<(ArtifactKind, KindFuture)> = kind
                .dependencies()
                .iter()
                .filter_map(|dep| tasks.get(dep).map(|task| (*dep, task.clone())))
                .collect();
            let task = revision.clone().run_kind(kind, producers).boxed().shared();
            tasks.insert(kind, task);
        }

        let handles: Vec<_> = tasks
            .into_iter()
            .map(|(kind, task)| (kind, tokio::spawn(task)))
            .collect();

        let mut succeeded = BTreeMap::new();
        let mut failed = BTreeMap::new();
        for (kind, handle) in handles {
            match handle.await {
                Ok(Ok(artifact)) => {
                    succeeded.insert(kind, artifact);
                }
                Ok(Err(failure)) => {
                    failed.insert(kind, failure);
                }
                Err(e) => {
                    failed.insert(
                        kind,
                        JobFailure::new(kind, FailureClass::Transient, format!("job task aborted: {e}")),
                    );
                }
            }
        }

        if let Some(thumbnail) = succeeded.get(&ArtifactKind::Thumbnail) {
            self.publish_project_thumbnail(project, thumbnail).await;
        }

        let ready = self.mandatory_kinds_published(project, hash, &plan, &succeeded).await?;

        info!(
            project = %project,
            hash = %hash,
            succeeded = succeeded.len(),
            failed = failed.len(),
            ready,
            "revision published"
        );
        Ok(RevisionResult {
            project: project.clone(),
            hash: hash.clone(),
            succeeded,
            failed,
            ready,
        })
    }

    /// Every mandatory kind is published for the revision: planned kinds
    /// must have succeeded in this run, unplanned ones must already exist.
    async fn mandatory_kinds_published(
        &self,
        project: &Project,
        hash: &RevisionHash,
        plan: &PublishPlan,
        succeeded: &BTreeMap<ArtifactKind, StoredArtifact>,
    ) -> PipelineResult<bool> {
        for &kind in &self.ctx.config.mandatory_kinds {
            if succeeded.contains_key(&kind) {
                continue;
            }
            if plan.contains(kind) || !self.ctx.store.exists(&project.key(hash, kind)).await? {
                debug!(project = %project, hash = %hash, %kind, "mandatory kind not published");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Copy the revision thumbnail to the project-level thumbnail key so
    /// listings show the latest revision.
    async fn publish_project_thumbnail(&self, project: &Project, thumbnail: &StoredArtifact) {
        let key = project.thumbnail_storage_key();
        let result = match self.ctx.store.get(&thumbnail.key).await {
            Ok(Some(data)) => self.ctx.store.put_staged(&key, data).await,
            Ok(None) => return,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(key = %key, error = %e, "failed to update project thumbnail");
        }
    }
}

impl std::fmt::Debug for PublishingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishingCoordinator")
            .field("ctx", &self.ctx)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

/// Per-revision state shared by the tasks of every kind.
#[derive(Clone)]
struct RevisionRun {
    ctx: JobContext,
    permits: Arc<Semaphore>,
    project: Project,
    hash: RevisionHash,
    source_key: String,
    cancel: CancellationToken,
}

impl RevisionRun {
    /// Wait for producers, then run attempts of `kind` until success, a
    /// non-retryable failure or the retry limit.
    async fn run_kind(self, kind: ArtifactKind, producers: Vec<(ArtifactKind, KindFuture)>) -> KindOutcome {
        let mut input = self.source_key.clone();
        for (dep, producer) in producers {
            match producer.await {
                Ok(artifact) => input = artifact.key,
                Err(failure) => {
                    debug!(%kind, %dep, "skipping job: producer failed");
                    return Err(JobFailure::new(
                        kind,
                        FailureClass::DependencyFailed,
                        format!("{dep} failed ({})", failure.class),
                    ));
                }
            }
        }

        let limit = self.ctx.config.transient_retry_limit;
        let mut retries = 0u32;
        loop {
            let attempt = retries + 1;
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(kind, attempt)),
                permit = Arc::clone(&self.permits).acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                return Err(self.cancelled(kind, attempt));
            };

            let mut job = DerivativeJob::new(
                self.ctx.clone(),
                self.project.clone(),
                self.hash.clone(),
                kind,
            )
            .map_err(|e| JobFailure::new(kind, FailureClass::Unsupported, e.to_string()))?;
            debug!(project = %self.project, hash = %self.hash, %kind, attempt, "starting job");
            let outcome = job.run(&input, &self.cancel).await;
            drop(permit);

            let mut failure = match outcome {
                Ok(artifact) => return Ok(artifact),
                Err(failure) => failure,
            };
            failure.attempts = attempt;
            if !failure.class.is_retryable() || retries >= limit {
                return Err(failure);
            }

            retries += 1;
            let delay = self.ctx.config.retry_backoff(retries);
            warn!(
                project = %self.project,
                hash = %self.hash,
                %kind,
                attempt,
                ?delay,
                error = %failure.message,
                "transient job failure, retrying"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(kind, attempt)),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn cancelled(&self, kind: ArtifactKind, attempts: u32) -> JobFailure {
        JobFailure {
            attempts,
            ..JobFailure::new(kind, FailureClass::Cancelled, "revision cancelled")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadpub_cache::CacheConfig;
    use cadpub_engine::{EngineEvent, FailureReason, Script, ScriptedEngine};
    use cadpub_store::InMemoryObjectStore;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<InMemoryObjectStore>,
        engine: Arc<ScriptedEngine>,
        coordinator: PublishingCoordinator,
    }

    fn fixture(config: PipelineConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryObjectStore::new("models"));
        let engine = Arc::new(ScriptedEngine::all("scripted"));
        let cache = Arc::new(LocalArtifactCache::new(CacheConfig {
            root: dir.path().to_path_buf(),
            ..Default::default()
        }));
        let coordinator = PublishingCoordinator::new(
            store.clone(),
            cache,
            EngineRegistry::new().with(engine.clone()),
            config,
        )
        .unwrap();
        Fixture {
            _dir: dir,
            store,
            engine,
            coordinator,
        }
    }

    fn fast() -> PipelineConfig {
        PipelineConfig {
            poll_interval_ms: 1,
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    fn wrench() -> (Project, RevisionHash) {
        (Project::new("Wrench").unwrap(), RevisionHash::new("h1").unwrap())
    }

    #[tokio::test]
    async fn optional_failure_keeps_revision_ready() {
        let f = fixture(fast());
        f.engine.script(
            ArtifactKind::Drawing,
            Script::Fail(FailureReason::UnsupportedDocumentType),
        );
        let (p, h) = wrench();
        let result = f
            .coordinator
            .publish(
                &p,
                &h,
                Bytes::from_static(b"ipt"),
                [ArtifactKind::Mesh, ArtifactKind::Bom, ArtifactKind::Drawing],
            )
            .await
            .unwrap();

        assert!(result.ready);
        assert!(result.artifact(ArtifactKind::Mesh).is_some());
        assert!(result.artifact(ArtifactKind::Bom).is_some());
        assert_eq!(
            result.failure(ArtifactKind::Drawing).unwrap().class,
            FailureClass::Unsupported
        );
        assert!(f.store.exists("projects-Wrench/h1").await.unwrap());
        assert!(!f.store.exists("cache-Wrench/h1/drawing.zip").await.unwrap());
        assert!(result.ensure_ready().is_ok());
    }

    #[tokio::test]
    async fn mandatory_failure_makes_revision_not_ready() {
        let f = fixture(fast());
        f.engine.script(
            ArtifactKind::Mesh,
            Script::Fail(FailureReason::UnsupportedDocumentType),
        );
        let (p, h) = wrench();
        let result = f
            .coordinator
            .publish(&p, &h, Bytes::from_static(b"ipt"), [ArtifactKind::Mesh, ArtifactKind::Bom])
            .await
            .unwrap();
        assert!(!result.ready);
        // Unsupported is never retried.
        assert_eq!(f.engine.submissions_of(ArtifactKind::Mesh), 1);
        let err = result.ensure_ready().unwrap_err();
        assert!(matches!(err, PipelineError::RevisionFailed { ref failures, .. } if failures.len() == 1));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_limit() {
        let f = fixture(fast());
        f.engine.script_sequence(
            ArtifactKind::Mesh,
            [
                Script::SubmitError,
                Script::Fail(FailureReason::Error("translator crashed".into())),
                Script::Succeed(Bytes::from_static(b"obj")),
            ],
        );
        let (p, h) = wrench();
        let result = f
            .coordinator
            .publish(&p, &h, Bytes::from_static(b"ipt"), [ArtifactKind::Mesh, ArtifactKind::Bom])
            .await
            .unwrap();
        assert!(result.artifact(ArtifactKind::Mesh).is_some());
        assert!(result.ready);
    }

    #[tokio::test]
    async fn unrequested_mandatory_kinds_must_already_be_published() {
        let f = fixture(fast());
        let (p, h) = wrench();
        let result = f
            .coordinator
            .publish(&p, &h, Bytes::from_static(b"ipt"), [ArtifactKind::Drawing])
            .await
            .unwrap();
        assert!(result.artifact(ArtifactKind::Drawing).is_some());
        assert!(result.failed.is_empty());
        assert!(!result.ready);
        assert!(result.ensure_ready().is_err());

        f.coordinator
            .publish(&p, &h, Bytes::from_static(b"ipt"), [ArtifactKind::Mesh, ArtifactKind::Bom])
            .await
            .unwrap();
        let again = f
            .coordinator
            .publish(&p, &h, Bytes::from_static(b"ipt"), [ArtifactKind::Drawing])
            .await
            .unwrap();
        assert!(again.ready);
    }

    #[tokio::test]
    async fn retry_limit_bounds_transient_failures() {
        let f = fixture(PipelineConfig {
            transient_retry_limit: 1,
            ..fast()
        });
        f.engine.script_sequence(
            ArtifactKind::Mesh,
            [
                Script::SubmitError,
                Script::SubmitError,
                Script::Succeed(Bytes::from_static(b"obj")),
            ],
        );
        let (p, h) = wrench();
        let result = f
            .coordinator
            .publish(&p, &h, Bytes::from_static(b"ipt"), [ArtifactKind::Mesh])
            .await
            .unwrap();
        let failure = result.failure(ArtifactKind::Mesh).unwrap();
        assert_eq!(failure.class, FailureClass::Transient);
        assert_eq!(failure.attempts, 2);
        assert!(!result.ready);
    }

    #[tokio::test]
    async fn consumers_start_after_producers_succeed() {
        let f = fixture(fast());
        f.engine
            .script(ArtifactKind::Bom, Script::RunningFor(3, Bytes::from_static(b"part,qty")));
        let (p, h) = wrench();
        let result = f
            .coordinator
            .publish(&p, &h, Bytes::from_static(b"ipt"), [ArtifactKind::BomJson])
            .await
            .unwrap();
        assert!(result.artifact(ArtifactKind::Bom).is_some());
        assert!(result.artifact(ArtifactKind::BomJson).is_some());

        let events = f.engine.events();
        let bom_done = events
            .iter()
            .position(|e| *e == EngineEvent::Finished(ArtifactKind::Bom))
            .unwrap();
        let json_start = events
            .iter()
            .position(|e| *e == EngineEvent::Submitted(ArtifactKind::BomJson))
            .unwrap();
        assert!(bom_done < json_start);

        // The consumer converts the producer's output, not the source model.
        let json_sub = f
            .engine
            .submissions()
            .into_iter()
            .find(|s| s.kind == ArtifactKind::BomJson)
            .unwrap();
        assert_eq!(json_sub.document.key, "cache-Wrench/h1/bom.csv");
    }

    #[tokio::test]
    async fn producer_failure_propagates_without_contacting_engine() {
        let f = fixture(fast());
        f.engine.script(
            ArtifactKind::Drawing,
            Script::Fail(FailureReason::TranslatorUnavailable),
        );
        let (p, h) = wrench();
        let result = f
            .coordinator
            .publish(&p, &h, Bytes::from_static(b"ipt"), [ArtifactKind::DrawingsList])
            .await
            .unwrap();
        assert_eq!(
            result.failure(ArtifactKind::DrawingsList).unwrap().class,
            FailureClass::DependencyFailed
        );
        assert_eq!(f.engine.submissions_of(ArtifactKind::DrawingsList), 0);
    }

    #[tokio::test]
    async fn fan_out_is_bounded() {
        let f = fixture(PipelineConfig {
            max_concurrent_jobs: 2,
            ..fast()
        });
        for kind in ArtifactKind::derivatives() {
            f.engine
                .script(kind, Script::RunningFor(5, Bytes::from(kind.as_str().to_string())));
        }
        let (p, h) = wrench();
        let result = f
            .coordinator
            .publish(&p, &h, Bytes::from_static(b"ipt"), ArtifactKind::derivatives())
            .await
            .unwrap();
        assert_eq!(result.succeeded.len(), 8);
        assert!(f.engine.peak_concurrency() <= 2);
        assert!(f.engine.peak_concurrency() >= 1);
    }

    #[tokio::test]
    async fn timeout_does_not_affect_siblings() {
        let f = fixture(PipelineConfig {
            job_timeout_secs: 1,
            ..fast()
        });
        f.engine.script(ArtifactKind::Svf, Script::Hang);
        let (p, h) = wrench();
        let result = f
            .coordinator
            .publish(&p, &h, Bytes::from_static(b"ipt"), [ArtifactKind::Svf, ArtifactKind::Mesh, ArtifactKind::Bom])
            .await
            .unwrap();
        assert_eq!(result.failure(ArtifactKind::Svf).unwrap().class, FailureClass::Timeout);
        assert_eq!(f.engine.submissions_of(ArtifactKind::Svf), 1);
        assert!(result.ready);
    }

    #[tokio::test]
    async fn cancellation_finalizes_no_artifacts() {
        let f = fixture(fast());
        for kind in [ArtifactKind::Mesh, ArtifactKind::Bom] {
            f.engine.script(kind, Script::Hang);
        }
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });
        let (p, h) = wrench();
        let result = f
            .coordinator
            .publish_with_cancel(
                &p,
                &h,
                Bytes::from_static(b"ipt"),
                [ArtifactKind::Mesh, ArtifactKind::Bom, ArtifactKind::BomJson],
                &cancel,
            )
            .await
            .unwrap();
        assert!(result.succeeded.is_empty());
        assert_eq!(result.failure(ArtifactKind::Mesh).unwrap().class, FailureClass::Cancelled);
        assert_eq!(
            result.failure(ArtifactKind::BomJson).unwrap().class,
            FailureClass::DependencyFailed
        );
        assert_eq!(f.store.keys(), vec!["projects-Wrench/h1".to_string()]);
        assert_eq!(f.engine.active_jobs(), 0);
    }

    #[tokio::test]
    async fn thumbnail_is_copied_to_project_level_key() {
        let f = fixture(fast());
        f.engine
            .script(ArtifactKind::Thumbnail, Script::Succeed(Bytes::from_static(b"<svg/>")));
        let (p, h) = wrench();
        f.coordinator
            .publish(&p, &h, Bytes::from_static(b"ipt"), [ArtifactKind::Thumbnail])
            .await
            .unwrap();
        let data = f.store.get(&p.thumbnail_storage_key()).await.unwrap().unwrap();
        assert_eq!(&data[..], b"<svg/>");
    }

    #[tokio::test]
    async fn source_model_cannot_be_requested() {
        let f = fixture(fast());
        let (p, h) = wrench();
        let err = f
            .coordinator
            .publish(&p, &h, Bytes::new(), [ArtifactKind::SourceModel])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument(_)));
        assert!(f.store.is_empty());
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let err = PublishingCoordinator::new(
            Arc::new(InMemoryObjectStore::new("models")),
            Arc::new(LocalArtifactCache::new(CacheConfig {
                root: dir.path().to_path_buf(),
                ..Default::default()
            })),
            EngineRegistry::new(),
            PipelineConfig {
                poll_interval_ms: 0,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}

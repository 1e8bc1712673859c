use std::sync::Arc;

use bytes::Bytes;
use cadpub_cache::LocalArtifactCache;
use cadpub_engine::{
    ConversionEngine, DocumentRef, EngineError, EngineJobId, EngineRegistry, FailureReason,
    JobStatus, OutputRef,
};
use cadpub_store::ObjectStore;
use cadpub_types::{ArtifactKind, Project, RevisionHash, StoredArtifact};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::{FailureClass, JobFailure, PipelineError, PipelineResult};

/// Lifecycle of a derivative job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Submitted,
    Running,
    Succeeded,
    Failed(FailureClass),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}

/// Collaborators shared by every job of a coordinator.
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<dyn ObjectStore>,
    pub cache: Arc<LocalArtifactCache>,
    pub engines: Arc<EngineRegistry>,
    pub config: Arc<PipelineConfig>,
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("bucket", &self.store.bucket())
            .field("cache", &self.cache)
            .field("engines", &self.engines)
            .finish()
    }
}

/// A job accepted by a remote engine.
#[derive(Clone)]
pub struct JobHandle {
    engine: Arc<dyn ConversionEngine>,
    id: EngineJobId,
}

impl JobHandle {
    /// The engine-side job id.
    pub fn id(&self) -> &EngineJobId {
        &self.id
    }

    /// Name of the engine running the job.
    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("engine", &self.engine.name())
            .field("id", &self.id)
            .finish()
    }
}

/// Map an engine-reported failure to a failure class.
pub fn classify(reason: &FailureReason) -> FailureClass {
    match reason {
        FailureReason::UnsupportedDocumentType | FailureReason::TranslatorUnavailable => {
            FailureClass::Unsupported
        }
        FailureReason::Error(_) => FailureClass::Transient,
    }
}

fn classify_engine_error(error: &EngineError) -> FailureClass {
    match error {
        EngineError::NoCapableEngine(_) => FailureClass::Unsupported,
        _ => FailureClass::Transient,
    }
}

/// Drives one remote conversion of one revision to a published artifact.
///
/// A job makes exactly one attempt; retries are the coordinator's business.
/// Its output becomes visible under the derived key only once fully
/// uploaded, and never after the revision was cancelled.
pub struct DerivativeJob {
    ctx: JobContext,
    target: StoredArtifact,
    state: JobState,
    handle: Option<JobHandle>,
    staged: Option<String>,
}

impl DerivativeJob {
    /// Create a pending job producing `kind` for `(project, hash)`.
    pub fn new(
        ctx: JobContext,
        project: Project,
        hash: RevisionHash,
        kind: ArtifactKind,
    ) -> PipelineResult<Self> {
        if !kind.is_derivative() {
            return Err(PipelineError::InvalidArgument(format!(
                "{kind} is not produced by a derivative job"
            )));
        }
        Ok(Self {
            ctx,
            target: StoredArtifact::new(project, hash, kind),
            state: JobState::Pending,
            handle: None,
            staged: None,
        })
    }

    pub fn kind(&self) -> ArtifactKind {
        self.target.kind
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// The artifact this job publishes on success.
    pub fn target(&self) -> &StoredArtifact {
        &self.target
    }

    /// Submit the conversion of the document stored under `source_key`.
    pub async fn start(&mut self, source_key: &str) -> Result<JobHandle, JobFailure> {
        let kind = self.target.kind;
        let Some(engine) = self.ctx.engines.resolve(kind) else {
            return Err(self.fail(
                FailureClass::Unsupported,
                format!("no engine can produce {kind}"),
            ));
        };

        let ttl = self.ctx.config.source_url_ttl();
        let url = match self.ctx.store.signed_url(source_key, ttl).await {
            Ok(url) => url,
            Err(e) => {
                return Err(self.fail(
                    FailureClass::Transient,
                    format!("cannot sign input document: {e}"),
                ))
            }
        };
        let document = DocumentRef {
            key: source_key.to_string(),
            url,
        };
        let options = self.ctx.config.export.for_kind(kind);

        let id = match engine.submit(&document, kind, &options).await {
            Ok(id) => id,
            Err(e) => return Err(self.fail(classify_engine_error(&e), format!("submit failed: {e}"))),
        };
        self.state = JobState::Submitted;
        debug!(
            project = %self.target.project,
            hash = %self.target.hash,
            %kind,
            engine = engine.name(),
            job = %id,
            "job submitted"
        );
        let handle = JobHandle { engine, id };
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Poll `handle` until it is terminal, then publish its output.
    pub async fn await_outcome(
        &mut self,
        handle: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<StoredArtifact, JobFailure> {
        let data = self.await_output(handle, cancel).await?;
        self.publish(data, cancel).await
    }

    /// Start and await one attempt.
    ///
    /// The configured deadline bounds the remote phase (submit, poll and
    /// fetch). On timeout the remote job is cancelled best-effort. Staging
    /// and finalizing the upload run after the deadline check, so a job
    /// never reports `Timeout` for an artifact it has published.
    pub async fn run(
        &mut self,
        source_key: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredArtifact, JobFailure> {
        let deadline = self.ctx.config.job_timeout();
        let remote = tokio::time::timeout(deadline, async {
            let handle = self.start(source_key).await?;
            self.await_output(&handle, cancel).await
        })
        .await;

        match remote {
            Ok(Ok(data)) => self.publish(data, cancel).await,
            Ok(Err(failure)) => Err(failure),
            Err(_) => {
                if let Some(handle) = self.handle.clone() {
                    cancel_remote(&handle).await;
                }
                Err(self.fail(
                    FailureClass::Timeout,
                    format!("no result within {deadline:?}"),
                ))
            }
        }
    }

    /// Poll until the remote job is terminal and fetch its output.
    async fn await_output(
        &mut self,
        handle: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<Bytes, JobFailure> {
        let interval = self.ctx.config.poll_interval();
        let output = loop {
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(handle).await),
                status = handle.engine.poll(&handle.id) => status,
            };
            match status {
                Ok(JobStatus::Succeeded(output)) => {
                    self.mark_running();
                    break output;
                }
                Ok(JobStatus::Running) => self.mark_running(),
                Ok(JobStatus::Failed(reason)) => {
                    return Err(self.fail(classify(&reason), reason.to_string()))
                }
                Err(e) => {
                    return Err(self.fail(classify_engine_error(&e), format!("poll failed: {e}")))
                }
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(handle).await),
                _ = tokio::time::sleep(interval) => {}
            }
        };
        self.fetch(handle, &output).await
    }

    async fn fetch(&mut self, handle: &JobHandle, output: &OutputRef) -> Result<Bytes, JobFailure> {
        handle.engine.fetch_output(output).await.map_err(|e| {
            self.fail(
                classify_engine_error(&e),
                format!("cannot fetch output: {e}"),
            )
        })
    }

    async fn publish(
        &mut self,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<StoredArtifact, JobFailure> {
        let key = self.target.key.clone();
        let store = Arc::clone(&self.ctx.store);
        let staged = match store.stage(&key, data.clone()).await {
            Ok(staged) => staged,
            Err(e) => return Err(self.fail(FailureClass::Transient, format!("upload failed: {e}"))),
        };
        self.staged = Some(staged.clone());

        if cancel.is_cancelled() {
            self.drop_staged().await;
            return Err(self.fail(
                FailureClass::Cancelled,
                "revision cancelled before the upload was finalized",
            ));
        }
        if let Err(e) = store.rename(&staged, &key).await {
            self.drop_staged().await;
            return Err(self.fail(
                FailureClass::Transient,
                format!("cannot finalize upload: {e}"),
            ));
        }
        self.staged = None;

        if let Err(e) = self.ctx.cache.put(&key, data).await {
            warn!(key = %key, error = %e, "cache write-through failed");
        }
        self.state = JobState::Succeeded;
        debug!(
            project = %self.target.project,
            hash = %self.target.hash,
            kind = %self.target.kind,
            key = %key,
            "artifact published"
        );
        Ok(self.target.clone())
    }

    fn mark_running(&mut self) {
        if self.state != JobState::Running {
            self.state = JobState::Running;
            debug!(kind = %self.target.kind, "job running");
        }
    }

    async fn cancelled(&mut self, handle: &JobHandle) -> JobFailure {
        cancel_remote(handle).await;
        self.fail(FailureClass::Cancelled, "revision cancelled")
    }

    async fn drop_staged(&mut self) {
        if let Some(staged) = self.staged.take() {
            if let Err(e) = self.ctx.store.delete(&staged).await {
                warn!(staged = %staged, error = %e, "failed to drop staged object");
            }
        }
    }

    fn fail(&mut self, class: FailureClass, message: impl Into<String>) -> JobFailure {
        let failure = JobFailure::new(self.target.kind, class, message);
        self.state = JobState::Failed(class);
        debug!(
            project = %self.target.project,
            hash = %self.target.hash,
            kind = %self.target.kind,
            %class,
            message = %failure.message,
            "job failed"
        );
        failure
    }
}

impl std::fmt::Debug for DerivativeJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivativeJob")
            .field("target", &self.target.key)
            .field("state", &self.state)
            .finish()
    }
}

async fn cancel_remote(handle: &JobHandle) {
    if let Err(e) = handle.engine.cancel(&handle.id).await {
        warn!(job = %handle.id, error = %e, "failed to cancel remote job");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadpub_cache::CacheConfig;
    use cadpub_engine::{Script, ScriptedEngine};
    use cadpub_store::InMemoryObjectStore;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<InMemoryObjectStore>,
        engine: Arc<ScriptedEngine>,
        ctx: JobContext,
    }

    const SOURCE: &str = "projects-Wrench/h1";

    async fn fixture(config: PipelineConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryObjectStore::new("models"));
        store.put(SOURCE, Bytes::from_static(b"ipt")).await.unwrap();
        let engine = Arc::new(ScriptedEngine::all("scripted"));
        let cache = LocalArtifactCache::new(CacheConfig {
            root: dir.path().to_path_buf(),
            ..Default::default()
        });
        let ctx = JobContext {
            store: store.clone(),
            cache: Arc::new(cache),
            engines: Arc::new(EngineRegistry::new().with(engine.clone())),
            config: Arc::new(config),
        };
        Fixture {
            _dir: dir,
            store,
            engine,
            ctx,
        }
    }

    fn fast() -> PipelineConfig {
        PipelineConfig {
            poll_interval_ms: 1,
            ..Default::default()
        }
    }

    fn job(f: &Fixture, kind: ArtifactKind) -> DerivativeJob {
        DerivativeJob::new(
            f.ctx.clone(),
            Project::new("Wrench").unwrap(),
            RevisionHash::new("h1").unwrap(),
            kind,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn success_publishes_and_caches() {
        let f = fixture(fast()).await;
        f.engine
            .script(ArtifactKind::Mesh, Script::RunningFor(2, Bytes::from_static(b"obj")));
        let mut j = job(&f, ArtifactKind::Mesh);
        assert_eq!(j.state(), JobState::Pending);

        let artifact = j.run(SOURCE, &CancellationToken::new()).await.unwrap();
        assert_eq!(artifact.key, "cache-Wrench/h1/model.obj.zip");
        assert_eq!(j.state(), JobState::Succeeded);
        assert_eq!(&f.store.get(&artifact.key).await.unwrap().unwrap()[..], b"obj");
        assert!(f.ctx.cache.get(&artifact.key).await.unwrap().is_some());
        assert_eq!(f.store.len(), 2);
    }

    #[tokio::test]
    async fn submission_carries_signed_source_and_options() {
        let f = fixture(fast()).await;
        job(&f, ArtifactKind::Mesh)
            .run(SOURCE, &CancellationToken::new())
            .await
            .unwrap();
        let sub = &f.engine.submissions()[0];
        assert_eq!(sub.document.key, SOURCE);
        assert!(f.store.signer().verify("models", SOURCE, &sub.document.url, chrono::Utc::now()));
        assert_eq!(sub.options, f.ctx.config.export.for_kind(ArtifactKind::Mesh));
    }

    #[tokio::test]
    async fn unsupported_document_is_not_transient() {
        let f = fixture(fast()).await;
        f.engine.script(
            ArtifactKind::Drawing,
            Script::Fail(FailureReason::UnsupportedDocumentType),
        );
        let mut j = job(&f, ArtifactKind::Drawing);
        let failure = j.run(SOURCE, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(failure.class, FailureClass::Unsupported);
        assert_eq!(j.state(), JobState::Failed(FailureClass::Unsupported));
        assert_eq!(f.store.len(), 1);
    }

    #[tokio::test]
    async fn missing_engine_is_unsupported() {
        let mut f = fixture(fast()).await;
        f.ctx.engines = Arc::new(EngineRegistry::new());
        let failure = job(&f, ArtifactKind::Svf)
            .run(SOURCE, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(failure.class, FailureClass::Unsupported);
    }

    #[tokio::test]
    async fn engine_errors_are_transient() {
        let f = fixture(fast()).await;
        f.engine.script(ArtifactKind::Bom, Script::SubmitError);
        f.engine.script(
            ArtifactKind::Svf,
            Script::Fail(FailureReason::Error("out of memory".into())),
        );
        for kind in [ArtifactKind::Bom, ArtifactKind::Svf] {
            let failure = job(&f, kind)
                .run(SOURCE, &CancellationToken::new())
                .await
                .unwrap_err();
            assert_eq!(failure.class, FailureClass::Transient, "{kind}");
        }
    }

    #[tokio::test]
    async fn deadline_cancels_remote_job() {
        let f = fixture(PipelineConfig {
            job_timeout_secs: 1,
            poll_interval_ms: 10,
            ..Default::default()
        })
        .await;
        f.engine.script(ArtifactKind::Svf, Script::Hang);
        let mut j = job(&f, ArtifactKind::Svf);
        let failure = j.run(SOURCE, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(failure.class, FailureClass::Timeout);
        assert_eq!(f.engine.active_jobs(), 0);
    }

    /// Store whose finalizing rename is slower than the job deadline.
    struct SlowFinalize {
        inner: InMemoryObjectStore,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl ObjectStore for SlowFinalize {
        fn bucket(&self) -> &str {
            self.inner.bucket()
        }
        async fn put(&self, key: &str, data: Bytes) -> cadpub_store::StoreResult<()> {
            self.inner.put(key, data).await
        }
        async fn get(&self, key: &str) -> cadpub_store::StoreResult<Option<Bytes>> {
            self.inner.get(key).await
        }
        async fn exists(&self, key: &str) -> cadpub_store::StoreResult<bool> {
            self.inner.exists(key).await
        }
        async fn delete(&self, key: &str) -> cadpub_store::StoreResult<bool> {
            self.inner.delete(key).await
        }
        async fn rename(&self, from: &str, to: &str) -> cadpub_store::StoreResult<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.rename(from, to).await
        }
        async fn signed_url(&self, key: &str, ttl: Duration) -> cadpub_store::StoreResult<String> {
            self.inner.signed_url(key, ttl).await
        }
    }

    #[tokio::test]
    async fn deadline_does_not_cover_finalizing_the_upload() {
        let mut f = fixture(PipelineConfig {
            job_timeout_secs: 1,
            poll_interval_ms: 1,
            ..Default::default()
        })
        .await;
        let store = Arc::new(SlowFinalize {
            inner: InMemoryObjectStore::new("models"),
            delay: Duration::from_millis(1300),
        });
        store.put(SOURCE, Bytes::from_static(b"ipt")).await.unwrap();
        f.ctx.store = store.clone();

        let mut j = job(&f, ArtifactKind::Mesh);
        let artifact = j.run(SOURCE, &CancellationToken::new()).await.unwrap();
        assert_eq!(j.state(), JobState::Succeeded);
        assert!(store.exists(&artifact.key).await.unwrap());
    }

    #[tokio::test]
    async fn cancellation_finalizes_nothing() {
        let f = fixture(fast()).await;
        f.engine.script(ArtifactKind::Svf, Script::Hang);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let mut j = job(&f, ArtifactKind::Svf);
        let failure = j.run(SOURCE, &cancel).await.unwrap_err();
        assert_eq!(failure.class, FailureClass::Cancelled);
        assert_eq!(f.store.keys(), vec![SOURCE.to_string()]);
    }

    #[tokio::test]
    async fn source_model_job_is_rejected() {
        let f = fixture(fast()).await;
        let err = DerivativeJob::new(
            f.ctx.clone(),
            Project::new("Wrench").unwrap(),
            RevisionHash::new("h1").unwrap(),
            ArtifactKind::SourceModel,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument(_)));
    }

    #[test]
    fn classification() {
        assert_eq!(classify(&FailureReason::TranslatorUnavailable), FailureClass::Unsupported);
        assert_eq!(classify(&FailureReason::UnsupportedDocumentType), FailureClass::Unsupported);
        assert_eq!(classify(&FailureReason::Error("x".into())), FailureClass::Transient);
    }
}

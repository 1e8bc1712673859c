use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use cadpub_types::ArtifactKind;

use crate::engine::{ConversionEngine, DocumentRef, EngineJobId, FailureReason, JobStatus, OutputRef};
use crate::error::{EngineError, EngineResult};
use crate::options::ExportOptions;

/// Behavior of one scripted submission.
#[derive(Clone, Debug)]
pub enum Script {
    /// Succeed on the first poll with the given output.
    Succeed(Bytes),
    /// Fail on the first poll with the given reason.
    Fail(FailureReason),
    /// Reject the submission itself with a transport-level error.
    SubmitError,
    /// Stay running until cancelled.
    Hang,
    /// Report `Running` for N polls, then succeed with the given output.
    RunningFor(u32, Bytes),
}

/// A recorded submission.
#[derive(Clone, Debug)]
pub struct Submission {
    pub job: EngineJobId,
    pub kind: ArtifactKind,
    pub document: DocumentRef,
    pub options: ExportOptions,
}

/// Lifecycle events in the order the engine observed them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    Submitted(ArtifactKind),
    Finished(ArtifactKind),
    Cancelled(ArtifactKind),
}

struct RemoteJob {
    kind: ArtifactKind,
    polls_left: u32,
    /// `None` while the job hangs.
    outcome: Option<JobStatus>,
    done: bool,
}

#[derive(Default)]
struct State {
    scripts: HashMap<ArtifactKind, VecDeque<Script>>,
    jobs: HashMap<EngineJobId, RemoteJob>,
    outputs: HashMap<OutputRef, Bytes>,
    submissions: Vec<Submission>,
    events: Vec<EngineEvent>,
    active: usize,
    peak: usize,
    next_id: u64,
}

impl State {
    /// Scripts are consumed in order; the last one repeats.
    fn next_script(&mut self, kind: ArtifactKind) -> Script {
        let queue = self.scripts.entry(kind).or_default();
        let script = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        script.unwrap_or_else(|| Script::Succeed(default_output(kind)))
    }

    fn finish(&mut self, id: &EngineJobId, event: fn(ArtifactKind) -> EngineEvent) {
        if let Some(job) = self.jobs.get_mut(id) {
            if !job.done {
                job.done = true;
                let kind = job.kind;
                self.active -= 1;
                self.events.push(event(kind));
            }
        }
    }
}

/// Output of an unscripted kind: well-formed content for kinds that are
/// parsed downstream, a marker text for everything else.
fn default_output(kind: ArtifactKind) -> Bytes {
    match kind {
        ArtifactKind::AdoptMessages | ArtifactKind::BomJson | ArtifactKind::DrawingsList => {
            Bytes::from_static(b"[]")
        }
        ArtifactKind::Thumbnail => Bytes::from_static(b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>"),
        _ => Bytes::from(format!("{kind} output")),
    }
}

/// Deterministic in-memory conversion engine.
///
/// Each kind follows a queue of [`Script`]s, one per submission; kinds
/// without a script succeed immediately. The engine records every
/// submission, the order of lifecycle events and the peak number of jobs
/// running at once.
pub struct ScriptedEngine {
    name: String,
    capabilities: Vec<ArtifactKind>,
    state: Mutex<State>,
}

impl ScriptedEngine {
    /// Create an engine producing `capabilities`.
    pub fn new(name: impl Into<String>, capabilities: impl IntoIterator<Item = ArtifactKind>) -> Self {
        Self {
            name: name.into(),
            capabilities: capabilities.into_iter().collect(),
            state: Mutex::new(State::default()),
        }
    }

    /// Create an engine producing every derivative kind.
    pub fn all(name: impl Into<String>) -> Self {
        Self::new(name, ArtifactKind::derivatives())
    }

    /// Append a script for the next submission of `kind`.
    pub fn script(&self, kind: ArtifactKind, script: Script) -> &Self {
        self.lock().scripts.entry(kind).or_default().push_back(script);
        self
    }

    /// Append several scripts for `kind`, consumed in order.
    pub fn script_sequence(&self, kind: ArtifactKind, scripts: impl IntoIterator<Item = Script>) -> &Self {
        self.lock().scripts.entry(kind).or_default().extend(scripts);
        self
    }

    /// Every submission accepted so far.
    pub fn submissions(&self) -> Vec<Submission> {
        self.lock().submissions.clone()
    }

    /// Number of accepted submissions of `kind`.
    pub fn submissions_of(&self, kind: ArtifactKind) -> usize {
        self.lock().submissions.iter().filter(|s| s.kind == kind).count()
    }

    /// Lifecycle events in observation order.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.lock().events.clone()
    }

    /// Jobs submitted but not yet terminal.
    pub fn active_jobs(&self) -> usize {
        self.lock().active
    }

    /// Highest number of jobs that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.lock().peak
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("lock poisoned")
    }
}

#[async_trait]
impl ConversionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[ArtifactKind] {
        &self.capabilities
    }

    async fn submit(
        &self,
        document: &DocumentRef,
        kind: ArtifactKind,
        options: &ExportOptions,
    ) -> EngineResult<EngineJobId> {
        let mut state = self.lock();
        let script = state.next_script(kind);
        if matches!(script, Script::SubmitError) {
            return Err(EngineError::Unavailable(format!(
                "{} rejected the {kind} submission",
                self.name
            )));
        }

        state.next_id += 1;
        let id = EngineJobId(format!("{}-job-{}", self.name, state.next_id));
        let output = OutputRef(format!("{}-output-{}", self.name, state.next_id));
        let (polls_left, outcome) = match script {
            Script::Succeed(data) => {
                state.outputs.insert(output.clone(), data);
                (0, Some(JobStatus::Succeeded(output)))
            }
            Script::RunningFor(polls, data) => {
                state.outputs.insert(output.clone(), data);
                (polls, Some(JobStatus::Succeeded(output)))
            }
            Script::Fail(reason) => (0, Some(JobStatus::Failed(reason))),
            Script::Hang | Script::SubmitError => (0, None),
        };
        state.jobs.insert(
            id.clone(),
            RemoteJob {
                kind,
                polls_left,
                outcome,
                done: false,
            },
        );
        state.submissions.push(Submission {
            job: id.clone(),
            kind,
            document: document.clone(),
            options: *options,
        });
        state.events.push(EngineEvent::Submitted(kind));
        state.active += 1;
        state.peak = state.peak.max(state.active);
        Ok(id)
    }

    async fn poll(&self, job: &EngineJobId) -> EngineResult<JobStatus> {
        let mut state = self.lock();
        let remote = state
            .jobs
            .get_mut(job)
            .ok_or_else(|| EngineError::UnknownJob(job.to_string()))?;
        let status = match &remote.outcome {
            None => return Ok(JobStatus::Running),
            Some(_) if remote.polls_left > 0 => {
                remote.polls_left -= 1;
                return Ok(JobStatus::Running);
            }
            Some(status) => status.clone(),
        };
        state.finish(job, EngineEvent::Finished);
        Ok(status)
    }

    async fn fetch_output(&self, output: &OutputRef) -> EngineResult<Bytes> {
        self.lock()
            .outputs
            .get(output)
            .cloned()
            .ok_or_else(|| EngineError::UnknownJob(output.to_string()))
    }

    async fn cancel(&self, job: &EngineJobId) -> EngineResult<()> {
        let mut state = self.lock();
        let remote = state
            .jobs
            .get_mut(job)
            .ok_or_else(|| EngineError::UnknownJob(job.to_string()))?;
        if !remote.done {
            remote.outcome = Some(JobStatus::Failed(FailureReason::Error("cancelled".into())));
            remote.polls_left = 0;
        }
        state.finish(job, EngineEvent::Cancelled);
        Ok(())
    }
}

impl std::fmt::Debug for ScriptedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedEngine")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

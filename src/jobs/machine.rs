use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;

use super::kinds::JobId;
use super::stream::StreamError;

#[derive(Clone, Debug, PartialEq)]
pub enum JobProgress<P> {
    Idle,
    Connecting,
    Processing { stage: String, percent: u8 },
    Completed(P),
    Failed(String),
}

impl<P> JobProgress<P> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobProgress::Completed(_) | JobProgress::Failed(_))
    }
}

/// What a wire event asks the machine to do.
pub enum Transition<P> {
    /// Accepted by the server but not started.
    Waiting,
    /// `percent: None` keeps the last known percentage.
    Progress { stage: String, percent: Option<u8> },
    Complete(P),
    Fail(String),
}

/// Static description of a job kind: its wire event, payload and feed path.
pub trait JobKind {
    type Event: DeserializeOwned + Send + 'static;
    type Payload: Clone + Send + Sync + 'static;

    const NAME: &'static str;
    /// Whether processing stages are appended to the observational log.
    const KEEPS_LOG: bool;

    fn stream_path(job_id: &JobId) -> String;
    fn transition(event: Self::Event) -> Transition<Self::Payload>;
}

/// An open event feed that can be torn down.
pub trait Connection: Send {
    /// Must be safe to call any number of times.
    fn close(&mut self);
}

/// The job id and its progress, always read and written together.
#[derive(Clone, Debug, PartialEq)]
pub struct JobSnapshot<P> {
    pub job_id: JobId,
    pub progress: JobProgress<P>,
}

/// Read-only view of a machine's current snapshot, shareable across threads.
#[derive(Clone)]
pub struct JobWatch<P> {
    inner: Arc<RwLock<JobSnapshot<P>>>,
}

impl<P: Clone> JobWatch<P> {
    pub fn get(&self) -> JobSnapshot<P> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Updated,
    /// The event moved the machine into a terminal state.
    Finished,
    /// The machine was already terminal; the event was dropped.
    Ignored,
}

type CompleteFn<P> = Box<dyn FnOnce(&P) + Send>;
type FailFn = Box<dyn FnOnce(&str) + Send>;

/// `Idle -> Connecting -> Processing* -> Completed | Failed`. Terminal states
/// accept nothing further and each callback fires at most once.
pub struct JobMachine<K: JobKind> {
    snapshot: Arc<RwLock<JobSnapshot<K::Payload>>>,
    log: Vec<String>,
    on_complete: Option<CompleteFn<K::Payload>>,
    on_failure: Option<FailFn>,
    connection: Option<Box<dyn Connection>>,
}

impl<K: JobKind> JobMachine<K> {
    pub fn new(job_id: JobId) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(JobSnapshot {
                job_id,
                progress: JobProgress::Idle,
            })),
            log: Vec::new(),
            on_complete: None,
            on_failure: None,
            connection: None,
        }
    }

    pub fn on_complete(mut self, f: impl FnOnce(&K::Payload) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_failure(mut self, f: impl FnOnce(&str) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }

    pub fn job_id(&self) -> JobId {
        self.read().job_id
    }

    pub fn progress(&self) -> JobProgress<K::Payload> {
        self.read().progress
    }

    pub fn is_terminal(&self) -> bool {
        self.read().progress.is_terminal()
    }

    pub fn watch(&self) -> JobWatch<K::Payload> {
        JobWatch {
            inner: Arc::clone(&self.snapshot),
        }
    }

    /// Append-only stage log (primary job only).
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Takes ownership of the job's feed and enters `Connecting`. Any feed
    /// already held is closed first. A terminal machine refuses and closes
    /// the offered feed; a new job is needed to connect again.
    pub fn attach(&mut self, mut connection: Box<dyn Connection>) -> bool {
        if self.is_terminal() {
            log::warn!("[{}] job {} already finished; not reconnecting", K::NAME, self.job_id());
            connection.close();
            return false;
        }
        self.close();
        self.connection = Some(connection);
        if matches!(self.progress(), JobProgress::Idle) {
            self.set(JobProgress::Connecting);
        }
        true
    }

    pub fn apply(&mut self, event: K::Event) -> Applied {
        if self.is_terminal() {
            log::debug!("[{}] job {} ignoring late event", K::NAME, self.job_id());
            return Applied::Ignored;
        }

        match K::transition(event) {
            Transition::Waiting => {
                if matches!(self.progress(), JobProgress::Idle) {
                    self.set(JobProgress::Connecting);
                }
                Applied::Updated
            }
            Transition::Progress { stage, percent } => {
                let previous = match self.progress() {
                    JobProgress::Processing { percent, .. } => percent,
                    _ => 0,
                };
                let percent = percent.unwrap_or(previous).min(100);
                // The server repeats the current status on every reconnect.
                if K::KEEPS_LOG && self.log.last() != Some(&stage) {
                    self.log.push(stage.clone());
                }
                log::info!("[{}] {} ({}%)", K::NAME, stage, percent);
                self.set(JobProgress::Processing { stage, percent });
                Applied::Updated
            }
            Transition::Complete(payload) => {
                self.close();
                self.set(JobProgress::Completed(payload.clone()));
                log::info!("[{}] job {} completed", K::NAME, self.job_id());
                if let Some(f) = self.on_complete.take() {
                    f(&payload);
                }
                self.on_failure = None;
                Applied::Finished
            }
            Transition::Fail(reason) => {
                self.close();
                self.set(JobProgress::Failed(reason.clone()));
                log::warn!("[{}] job {} failed: {}", K::NAME, self.job_id(), reason);
                if let Some(f) = self.on_failure.take() {
                    f(&reason);
                }
                self.on_complete = None;
                Applied::Finished
            }
        }
    }

    /// Transport trouble is transient: logged, never a state change.
    pub fn transport_error(&self, err: &StreamError) {
        if self.is_terminal() {
            return;
        }
        log::warn!("[{}] job {} connection trouble: {}", K::NAME, self.job_id(), err);
    }

    /// Closes the feed if one is open. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
    }

    fn read(&self) -> JobSnapshot<K::Payload> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, progress: JobProgress<K::Payload>) {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        guard.progress = progress;
    }
}

impl<K: JobKind> Drop for JobMachine<K> {
    fn drop(&mut self) {
        self.close();
    }
}

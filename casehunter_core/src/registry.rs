use crate::campaign::{
    CampaignError, CampaignReport, CancelToken, CaseFiles, ProgressLog, StopReason, case_files,
};
use crate::run::RunOutcome;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown job {0}")]
    UnknownJob(Uuid),
    #[error("Failed to spawn worker for job {0}")]
    Spawn(Uuid),
}

/// Handles a job receives from the registry: its cancellation token and the
/// log its progress is reported through.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub cancel: CancelToken,
    pub log: ProgressLog,
}

/// Point-in-time view of a job.
///
/// A finished job with no outcomes either passed every trial or failed with
/// an error; the error only shows up in the logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub finished: bool,
    pub outcomes: Vec<RunOutcome>,
    pub trials_run: usize,
    pub stop_reason: Option<StopReason>,
    /// Progress lines reported so far.
    pub log: Vec<String>,
}

impl JobSnapshot {
    pub fn cases(&self) -> BTreeMap<String, CaseFiles> {
        case_files(&self.outcomes)
    }
}

#[derive(Debug, Default)]
struct JobState {
    finished: bool,
    report: Option<CampaignReport>,
}

struct JobEntry {
    handle: Option<JoinHandle<()>>,
    context: JobContext,
    state: Arc<Mutex<JobState>>,
}

fn snapshot(id: Uuid, state: &Mutex<JobState>, log: &ProgressLog) -> JobSnapshot {
    let state = state.lock();
    let report = state.report.as_ref();
    JobSnapshot {
        id,
        finished: state.finished,
        outcomes: report.map(|r| r.outcomes.clone()).unwrap_or_default(),
        trials_run: report.map_or(0, |r| r.trials_run),
        stop_reason: report.map(|r| r.stop_reason),
        log: log.lines(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Campaigns running on worker threads, keyed by a random id.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<Uuid, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `job` on its own thread.
    ///
    /// The job is marked finished however it ends. Errors and panics are
    /// logged and leave the job without outcomes.
    pub fn submit<F>(&self, job: F) -> Result<Uuid, RegistryError>
    where
        F: FnOnce(JobContext) -> Result<CampaignReport, CampaignError> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let context = JobContext {
            cancel: CancelToken::new(),
            log: ProgressLog::new(),
        };
        let state = Arc::new(Mutex::new(JobState::default()));

        let worker_context = context.clone();
        let worker_state = Arc::clone(&state);
        let handle = std::thread::Builder::new()
            .name(format!("casehunter-{id}"))
            .spawn(move || {
                let _span = tracing::info_span!("job", %id).entered();
                info!("Job started");
                let log = worker_context.log.clone();
                let run = AssertUnwindSafe(|| job(worker_context));
                let report = match panic::catch_unwind(run) {
                    Ok(Ok(report)) => Some(report),
                    Ok(Err(e)) => {
                        error!("Job {} failed: {}", id, e);
                        log.push(format!("Job failed: {e}"));
                        None
                    }
                    Err(payload) => {
                        let message = panic_message(&*payload);
                        error!("Job {} panicked: {}", id, message);
                        log.push(format!("Job panicked: {message}"));
                        None
                    }
                };
                let mut state = worker_state.lock();
                state.report = report;
                state.finished = true;
                info!("Job finished");
            })
            .map_err(|e| {
                error!("Failed to spawn worker thread: {}", e);
                RegistryError::Spawn(id)
            })?;

        self.jobs.lock().insert(
            id,
            JobEntry {
                handle: Some(handle),
                context,
                state,
            },
        );
        Ok(id)
    }

    pub fn status(&self, id: Uuid) -> Result<JobSnapshot, RegistryError> {
        let jobs = self.jobs.lock();
        let entry = jobs.get(&id).ok_or(RegistryError::UnknownJob(id))?;
        Ok(snapshot(id, &entry.state, &entry.context.log))
    }

    pub fn list(&self) -> Vec<JobSnapshot> {
        self.jobs
            .lock()
            .iter()
            .map(|(id, entry)| snapshot(*id, &entry.state, &entry.context.log))
            .collect()
    }

    /// Forgets the job and asks it to stop before its next trial.
    pub fn cancel(&self, id: Uuid) -> Result<JobSnapshot, RegistryError> {
        let entry = self
            .jobs
            .lock()
            .remove(&id)
            .ok_or(RegistryError::UnknownJob(id))?;
        entry.context.cancel.cancel();
        info!("Cancelled job {}", id);
        Ok(snapshot(id, &entry.state, &entry.context.log))
    }

    /// Blocks until the job's worker exits.
    pub fn wait(&self, id: Uuid) -> Result<JobSnapshot, RegistryError> {
        let (handle, state, log) = {
            let mut jobs = self.jobs.lock();
            let entry = jobs.get_mut(&id).ok_or(RegistryError::UnknownJob(id))?;
            (
                entry.handle.take(),
                Arc::clone(&entry.state),
                entry.context.log.clone(),
            )
        };

        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Worker for job {} exited abnormally", id);
                state.lock().finished = true;
            }
        }
        Ok(snapshot(id, &state, &log))
    }
}

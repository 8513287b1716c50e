// src/session.rs

//! Client-side session state and the epoch that guards it.
//!
//! Every asynchronous continuation (status poll, listing fetch, start
//! response) captures the [`Epoch`] current when it was launched and writes
//! through [`Session::apply`]. A new submission or a reset bumps the epoch,
//! so anything still in flight from before is dropped on arrival.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::job::{Job, JobId, JobPhase, JobStatus, StemFile, TrackMeta};
use crate::observers::{CompletedRecord, QueueSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Epoch(u64);

/// Results handed to the presenter at the moment they are revealed. Survives
/// idle settling; only a reset or a new submission discards an untaken one.
#[derive(Debug, Clone, PartialEq)]
pub struct RevealedJob {
    pub job_id: JobId,
    pub track_name: String,
    pub meta: TrackMeta,
    pub files: Vec<StemFile>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub job: Option<Job>,
    /// A submission is in flight or a job is being tracked to completion.
    pub busy: bool,
    /// Set when the server refused to start a job.
    pub submit_error: Option<String>,
    /// Results are visible (set a beat after they are stored).
    pub show_results: bool,
    pub queue: QueueSnapshot,
    pub completed: Vec<CompletedRecord>,
    /// Toggles archive polling.
    pub completed_enabled: bool,
    reveal: Option<RevealedJob>,
    epoch: Epoch,
}

impl SessionState {
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn status(&self) -> JobStatus {
        match self.job.as_ref().map(|j| &j.phase) {
            None if self.busy => JobStatus::Downloading,
            None => JobStatus::Idle,
            Some(JobPhase::Active(stage)) => JobStatus::from(*stage),
            Some(JobPhase::Done { .. }) => JobStatus::Done,
            Some(JobPhase::Failed { .. }) => JobStatus::Error,
        }
    }

    /// Job failure first, then a refused submission.
    pub fn error(&self) -> Option<&str> {
        self.job
            .as_ref()
            .and_then(Job::error_message)
            .or(self.submit_error.as_deref())
    }

    /// Status label, suffixed with the job the server is working on right now.
    pub fn status_text(&self) -> String {
        let label = self.status().label();
        match &self.queue.current {
            Some(current) if !label.is_empty() && !current.display_name.is_empty() => {
                format!("{label} ({})", current.display_name)
            }
            _ => label.to_string(),
        }
    }

    /// The stem list, once revealed.
    pub fn revealed_results(&self) -> Option<&[StemFile]> {
        if !self.show_results {
            return None;
        }
        self.job.as_ref().and_then(Job::results)
    }

    /// Flip `show_results` and queue the listed stems for the presenter.
    pub fn reveal(&mut self) {
        self.show_results = true;
        self.reveal = self.job.as_ref().and_then(|job| match &job.phase {
            JobPhase::Done { meta, files: Some(files) } => Some(RevealedJob {
                job_id: job.id.clone(),
                track_name: job.track_name.clone(),
                meta: meta.clone(),
                files: files.clone(),
            }),
            _ => None,
        });
    }

    /// A reveal nobody has taken yet.
    pub fn pending_reveal(&self) -> Option<&RevealedJob> {
        self.reveal.as_ref()
    }

    pub fn accepts_submission(&self) -> bool {
        !self.busy
    }

    pub fn clear_job(&mut self) {
        self.job = None;
        self.busy = false;
        self.submit_error = None;
        self.show_results = false;
    }

    /// After a queue refresh: a finished, revealed job with nothing left on the
    /// server goes back to idle. Failures stay on screen until reset.
    /// Returns true if the job was cleared.
    pub fn settle_if_idle(&mut self) -> bool {
        let done = matches!(self.job.as_ref().map(|j| &j.phase), Some(JobPhase::Done { .. }));
        if !self.busy && done && self.show_results && self.queue.is_idle() {
            self.clear_job();
            self.epoch.0 += 1;
            true
        } else {
            false
        }
    }
}

/// Shared handle to the session. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears the previous job, marks busy, arms archive polling and returns
    /// the epoch the new submission owns.
    pub fn begin_submission(&self) -> Epoch {
        let mut state = self.lock();
        state.clear_job();
        state.reveal = None;
        state.busy = true;
        state.completed_enabled = true;
        state.epoch.0 += 1;
        state.epoch
    }

    /// Run `f` only if `epoch` is still current. `None` means the write was stale.
    pub fn apply<R>(&self, epoch: Epoch, f: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        let mut state = self.lock();
        if state.epoch != epoch {
            log::debug!("Dropping stale update from epoch {:?} (now {:?})", epoch, state.epoch);
            return None;
        }
        Some(f(&mut state))
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.lock().epoch == epoch
    }

    /// Forget the job. Queue and archive mirrors are left alone.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.clear_job();
        state.reveal = None;
        state.epoch.0 += 1;
    }

    /// Take the latest reveal, once.
    pub fn take_reveal(&self) -> Option<RevealedJob> {
        self.lock().reveal.take()
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.lock())
    }

    /// Epoch-free write, for the mirrors that don't belong to a job.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn set_completed_enabled(&self, enabled: bool) {
        self.lock().completed_enabled = enabled;
    }
}

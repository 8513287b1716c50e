// src/job/poller.rs

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

use super::{JobId, JobPhase, RemoteStatus, TrackMeta, PROCESSING_ERROR_FALLBACK};
use crate::config::ClientConfig;
use crate::service::{StatusReport, StemService};
use crate::session::{Epoch, Session, SessionState};

/// Polls `/status/{id}` for the job the session is tracking. At most one
/// loop runs at a time; starting a new one aborts the old.
pub struct JobStatusPoller<S: StemService> {
    service: Arc<S>,
    session: Session,
    period: Duration,
    reveal_delay: Duration,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<S: StemService> Clone for JobStatusPoller<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            session: self.session.clone(),
            period: self.period,
            reveal_delay: self.reveal_delay,
            task: Arc::clone(&self.task),
        }
    }
}

impl<S: StemService> JobStatusPoller<S> {
    pub fn new(service: Arc<S>, session: Session, config: &ClientConfig) -> Self {
        Self {
            service,
            session,
            period: config.status_interval,
            reveal_delay: config.reveal_delay,
            task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn start(&self, epoch: Epoch, job_id: JobId, song_name: String) {
        let ctx = PollContext {
            service: Arc::clone(&self.service),
            session: self.session.clone(),
            epoch,
            job_id,
            song_name,
            reveal_delay: self.reveal_delay,
        };
        let period = self.period;
        let handle = tokio::spawn(async move { ctx.run(period).await });

        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    pub fn stop(&self) {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = slot.take() {
            old.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

enum Step {
    Continue,
    Finished,
}

struct PollContext<S: StemService> {
    service: Arc<S>,
    session: Session,
    epoch: Epoch,
    job_id: JobId,
    song_name: String,
    reveal_delay: Duration,
}

impl<S: StemService> PollContext<S> {
    async fn run(self, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !self.session.is_current(self.epoch) {
                log::debug!("Poller for {} superseded", self.job_id);
                return;
            }
            match self.service.job_status(&self.job_id).await {
                Ok(report) => {
                    if let Step::Finished = self.handle(report).await {
                        return;
                    }
                }
                Err(e) => log::debug!("Status poll for {} skipped: {e}", self.job_id),
            }
        }
    }

    async fn handle(&self, report: StatusReport) -> Step {
        match report.status {
            RemoteStatus::Stage(stage) => {
                let applied = self.session.apply(self.epoch, |state| {
                    if let Some(job) = state.job.as_mut() {
                        job.phase = JobPhase::Active(stage);
                    }
                });
                if applied.is_none() {
                    return Step::Finished;
                }
                Step::Continue
            }
            RemoteStatus::Unrecognized(raw) => {
                log::debug!("Ignoring status '{raw}' for {}", self.job_id);
                Step::Continue
            }
            RemoteStatus::Error => {
                let message = report.error.unwrap_or_else(|| PROCESSING_ERROR_FALLBACK.to_string());
                log::warn!("❌ Job {} failed: {message}", self.job_id);
                self.session.apply(self.epoch, |state| {
                    state.busy = false;
                    if let Some(job) = state.job.as_mut() {
                        job.phase = JobPhase::Failed { message };
                    }
                });
                Step::Finished
            }
            RemoteStatus::Done => {
                self.finish(report.meta).await;
                Step::Finished
            }
        }
    }

    async fn finish(&self, meta: TrackMeta) {
        // --- 1. Mark done, results not yet listed ---
        let stored = self.session.apply(self.epoch, |state| {
            state.busy = false;
            if let Some(job) = state.job.as_mut() {
                job.phase = JobPhase::Done { meta, files: None };
            }
        });
        if stored.is_none() {
            return;
        }

        // --- 2. Fetch the stem listing ---
        let files = match self.service.list_files(&self.job_id, &self.song_name).await {
            Ok(files) => {
                log::info!("✅ Job {} done, {} file(s)", self.job_id, files.len());
                Some(files)
            }
            Err(e) => {
                log::warn!("⚠️ Could not list results for {}: {e}", self.job_id);
                None
            }
        };
        let stored = self.session.apply(self.epoch, |state| {
            if let Some(JobPhase::Done { files: slot, .. }) = state.job.as_mut().map(|j| &mut j.phase) {
                *slot = files;
            }
        });
        if stored.is_none() {
            return;
        }

        // --- 3. Reveal ---
        sleep(self.reveal_delay).await;
        self.session.apply(self.epoch, SessionState::reveal);
    }
}

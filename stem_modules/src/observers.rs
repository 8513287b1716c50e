// src/observers.rs

//! Background mirrors of the server's queue and completed archive.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::job::{sort_stems, JobId, StemFile, TrackMeta};
use crate::service::StemService;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub job_id: JobId,
    pub display_name: String,
}

/// Latest `/queue` answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub entries: Vec<QueueEntry>,
    pub current: Option<QueueEntry>,
}

impl QueueSnapshot {
    pub fn is_idle(&self) -> bool {
        self.entries.is_empty() && self.current.is_none()
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.entries.iter().any(|e| &e.job_id == job_id)
            || self.current.as_ref().is_some_and(|c| &c.job_id == job_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedRecord {
    pub job_id: JobId,
    pub song_name: String,
    pub source_url: Option<String>,
    pub meta: TrackMeta,
    pub stems: Vec<StemFile>,
}

impl CompletedRecord {
    pub fn sorted_stems(&self) -> Vec<StemFile> {
        let mut stems = self.stems.clone();
        sort_stems(&mut stems);
        stems
    }
}

/// A spawned polling loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct ObserverHandle {
    task: JoinHandle<()>,
}

impl ObserverHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn spawn_loop<F, Fut>(period: Duration, mut tick: F) -> ObserverHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = bool> + Send,
{
    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tick().await;
        }
    });
    ObserverHandle { task }
}

/// Mirrors `/queue` into the session and settles a finished job once the
/// server goes idle.
pub struct QueueObserver<S: StemService> {
    service: Arc<S>,
    session: Session,
    period: Duration,
}

impl<S: StemService> Clone for QueueObserver<S> {
    fn clone(&self) -> Self {
        Self { service: Arc::clone(&self.service), session: self.session.clone(), period: self.period }
    }
}

impl<S: StemService> QueueObserver<S> {
    pub fn new(service: Arc<S>, session: Session, period: Duration) -> Self {
        Self { service, session, period }
    }

    pub fn spawn(&self) -> ObserverHandle {
        let this = self.clone();
        spawn_loop(self.period, move || {
            let this = this.clone();
            async move { this.tick().await }
        })
    }

    /// One refresh. Returns false if the fetch failed (mirror left as is).
    pub async fn tick(&self) -> bool {
        match self.service.queue().await {
            Ok(snapshot) => {
                self.session.update(|state| {
                    state.queue = snapshot;
                    if state.settle_if_idle() {
                        log::info!("Server idle, clearing finished job");
                    }
                });
                true
            }
            Err(e) => {
                log::debug!("Queue refresh skipped: {e}");
                false
            }
        }
    }

    /// Ask the server to drop a queued job. The mirror is not touched; the
    /// next tick shows the result. Errors are logged only.
    pub fn remove(&self, job_id: JobId) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        tokio::spawn(async move {
            match service.remove_job(&job_id).await {
                Ok(()) => log::info!("Requested removal of {job_id}"),
                Err(e) => log::warn!("⚠️ Could not remove {job_id}: {e}"),
            }
        })
    }
}

/// Mirrors `/completed` while archive polling is enabled.
pub struct CompletedArchiveObserver<S: StemService> {
    service: Arc<S>,
    session: Session,
    period: Duration,
}

impl<S: StemService> Clone for CompletedArchiveObserver<S> {
    fn clone(&self) -> Self {
        Self { service: Arc::clone(&self.service), session: self.session.clone(), period: self.period }
    }
}

impl<S: StemService> CompletedArchiveObserver<S> {
    pub fn new(service: Arc<S>, session: Session, period: Duration) -> Self {
        Self { service, session, period }
    }

    pub fn spawn(&self) -> ObserverHandle {
        let this = self.clone();
        spawn_loop(self.period, move || {
            let this = this.clone();
            async move { this.tick().await }
        })
    }

    /// One refresh, skipped while disabled. Returns true if the mirror changed.
    pub async fn tick(&self) -> bool {
        if !self.session.with(|s| s.completed_enabled) {
            return false;
        }
        match self.service.completed().await {
            Ok(records) => {
                self.session.update(|state| state.completed = records);
                true
            }
            Err(e) => {
                log::debug!("Archive refresh skipped: {e}");
                false
            }
        }
    }
}

// src/job/gateway.rs

use std::sync::Arc;

use super::{Job, JobId, JobMode, JobPhase, JobStatusPoller, Stage};
use crate::config::ClientConfig;
use crate::error::SubmitError;
use crate::service::StemService;
use crate::session::Session;

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub source_url: String,
    pub track_name: String,
    pub mode: JobMode,
}

impl JobRequest {
    pub fn new(source_url: impl Into<String>, track_name: impl Into<String>, mode: JobMode) -> Self {
        Self { source_url: source_url.into(), track_name: track_name.into(), mode }
    }
}

/// What `/start` handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedJob {
    pub job_id: JobId,
    /// The server's (sanitized) name; later endpoints key on it.
    pub track_name: String,
    pub output_location: Option<String>,
}

/// Starts jobs and hands them to the status poller.
pub struct JobSubmissionGateway<S: StemService> {
    service: Arc<S>,
    session: Session,
    poller: JobStatusPoller<S>,
}

impl<S: StemService> JobSubmissionGateway<S> {
    pub fn new(service: Arc<S>, session: Session, config: &ClientConfig) -> Self {
        let poller = JobStatusPoller::new(Arc::clone(&service), session.clone(), config);
        Self { service, session, poller }
    }

    pub fn poller(&self) -> &JobStatusPoller<S> {
        &self.poller
    }

    /// Replaces whatever job was being tracked with a new one.
    pub async fn submit(&self, request: JobRequest) -> Result<StartedJob, SubmitError> {
        // --- 1. Drop the previous job ---
        self.poller.stop();
        let epoch = self.session.begin_submission();
        log::info!("Submitting '{}' ({})", request.track_name, request.mode.as_wire());

        // --- 2. Ask the server ---
        match self.service.start_job(&request).await {
            Ok(started) => {
                let job = Job {
                    id: started.job_id.clone(),
                    track_name: started.track_name.clone(),
                    source_url: request.source_url,
                    mode: request.mode,
                    output_location: started.output_location.clone(),
                    phase: JobPhase::Active(Stage::Downloading),
                };
                // --- 3. Track it, unless something newer landed meanwhile ---
                self.session
                    .apply(epoch, |state| state.job = Some(job))
                    .ok_or(SubmitError::Superseded)?;
                self.poller.start(epoch, started.job_id.clone(), started.track_name.clone());
                log::info!("🚀 Job {} started", started.job_id);
                Ok(started)
            }
            Err(e) => {
                log::error!("Start request failed: {e}");
                let rejected = SubmitError::Rejected(e);
                let message = rejected.to_string();
                self.session.apply(epoch, |state| {
                    state.busy = false;
                    state.submit_error = Some(message);
                });
                Err(rejected)
            }
        }
    }

    /// Back to idle. Queue and archive mirrors survive.
    pub fn reset(&self) {
        self.poller.stop();
        self.session.reset();
    }
}

// src/client.rs

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{ServiceError, SubmitError};
use crate::job::{JobId, JobRequest, JobSubmissionGateway, StartedJob};
use crate::observers::{CompletedArchiveObserver, ObserverHandle, QueueObserver};
use crate::service::{HttpStemService, StemService};
use crate::session::Session;

/// Running observer loops. Dropping this stops both.
#[derive(Debug)]
pub struct Observers {
    pub queue: ObserverHandle,
    pub completed: ObserverHandle,
}

/// Everything a front end needs: one session, one gateway, the observers.
pub struct StemClient<S: StemService> {
    service: Arc<S>,
    session: Session,
    config: ClientConfig,
    gateway: JobSubmissionGateway<S>,
    queue: QueueObserver<S>,
    completed: CompletedArchiveObserver<S>,
}

impl StemClient<HttpStemService> {
    pub fn connect(config: ClientConfig) -> Result<Self, ServiceError> {
        let service = HttpStemService::new(&config)?;
        Ok(Self::new(Arc::new(service), config))
    }
}

impl<S: StemService> StemClient<S> {
    pub fn new(service: Arc<S>, config: ClientConfig) -> Self {
        let session = Session::new();
        let gateway = JobSubmissionGateway::new(Arc::clone(&service), session.clone(), &config);
        let queue = QueueObserver::new(Arc::clone(&service), session.clone(), config.queue_interval);
        let completed =
            CompletedArchiveObserver::new(Arc::clone(&service), session.clone(), config.completed_interval);
        Self { service, session, config, gateway, queue, completed }
    }

    /// Spawn the queue and archive loops. Needs a tokio runtime.
    pub fn start_observers(&self) -> Observers {
        Observers { queue: self.queue.spawn(), completed: self.completed.spawn() }
    }

    pub async fn submit(&self, request: JobRequest) -> Result<StartedJob, SubmitError> {
        self.gateway.submit(request).await
    }

    pub fn reset(&self) {
        self.gateway.reset();
    }

    pub fn remove_queued(&self, job_id: JobId) -> JoinHandle<()> {
        self.queue.remove(job_id)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn queue_observer(&self) -> &QueueObserver<S> {
        &self.queue
    }

    pub fn completed_observer(&self) -> &CompletedArchiveObserver<S> {
        &self.completed
    }

    pub fn is_polling(&self) -> bool {
        self.gateway.poller().is_running()
    }
}

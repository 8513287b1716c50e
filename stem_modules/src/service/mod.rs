// src/service/mod.rs

pub mod http;
mod wire;

pub use http::HttpStemService;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::job::{JobId, JobRequest, RemoteStatus, StartedJob, StemFile, TrackMeta};
use crate::observers::{CompletedRecord, QueueSnapshot};

/// One answer from `/status/{job_id}`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: RemoteStatus,
    pub meta: TrackMeta,
    pub error: Option<String>,
}

/// The remote processing server, as the client sees it.
#[async_trait]
pub trait StemService: Send + Sync + 'static {
    async fn start_job(&self, request: &JobRequest) -> Result<StartedJob, ServiceError>;

    async fn job_status(&self, job_id: &JobId) -> Result<StatusReport, ServiceError>;

    async fn list_files(&self, job_id: &JobId, song_name: &str) -> Result<Vec<StemFile>, ServiceError>;

    async fn queue(&self) -> Result<QueueSnapshot, ServiceError>;

    async fn completed(&self) -> Result<Vec<CompletedRecord>, ServiceError>;

    async fn remove_job(&self, job_id: &JobId) -> Result<(), ServiceError>;

    /// Raw bytes of a stem (or any file the server listed).
    async fn fetch_audio(&self, url: &str) -> Result<Vec<u8>, ServiceError>;

    /// Zip of every file a finished job produced.
    async fn fetch_archive(&self, job_id: &JobId, song_name: &str) -> Result<Vec<u8>, ServiceError>;
}

//! Scripted in-memory stem server shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stem_modules::config::ClientConfig;
use stem_modules::error::ServiceError;
use stem_modules::job::{JobId, JobMode, JobRequest, RemoteStatus, StartedJob, StemFile, TrackMeta};
use stem_modules::observers::{CompletedRecord, QueueEntry, QueueSnapshot};
use stem_modules::service::{StatusReport, StemService};
use stem_modules::StemClient;

/// One scripted answer: a value, or a 503.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Fail,
}

impl<T> Reply<T> {
    fn into_result(self, endpoint: &str) -> Result<T, ServiceError> {
        match self {
            Reply::Ok(v) => Ok(v),
            Reply::Fail => Err(ServiceError::status(endpoint, 503)),
        }
    }
}

pub fn status(raw: &str) -> Reply<StatusReport> {
    Reply::Ok(StatusReport { status: RemoteStatus::parse(raw), meta: TrackMeta::default(), error: None })
}

pub fn done_with(tempo: &str, key: &str) -> Reply<StatusReport> {
    Reply::Ok(StatusReport {
        status: RemoteStatus::Done,
        meta: TrackMeta { tempo: Some(tempo.into()), key: Some(key.into()) },
        error: None,
    })
}

pub fn failed(message: Option<&str>) -> Reply<StatusReport> {
    Reply::Ok(StatusReport {
        status: RemoteStatus::Error,
        meta: TrackMeta::default(),
        error: message.map(str::to_string),
    })
}

pub fn stem(job: &str, name: &str) -> StemFile {
    StemFile { url: format!("/download/{job}/{name}"), display_name: name.to_string() }
}

pub fn entry(id: &str, name: &str) -> QueueEntry {
    QueueEntry { job_id: JobId::from(id), display_name: name.to_string() }
}

pub fn request(name: &str) -> JobRequest {
    JobRequest::new(format!("https://www.youtube.com/watch?v={name}"), name, JobMode::StemSplit)
}

#[derive(Default)]
struct Script {
    /// `/start` answers in call order, each with a delay before it arrives.
    starts: VecDeque<(Duration, Reply<StartedJob>)>,
    /// Per-job status answers, each with its delay; the last one repeats forever.
    statuses: HashMap<JobId, VecDeque<(Duration, Reply<StatusReport>)>>,
    files: HashMap<JobId, Reply<Vec<StemFile>>>,
    queue: Option<Reply<QueueSnapshot>>,
    completed: Vec<CompletedRecord>,
}

#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub starts: usize,
    pub status: HashMap<JobId, usize>,
    pub files: usize,
    pub queue: usize,
    pub completed: usize,
    pub removed: Vec<JobId>,
}

#[derive(Default)]
pub struct FakeService {
    script: Mutex<Script>,
    calls: Mutex<Calls>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_ok(&self, job_id: &str, song: &str) -> &Self {
        self.start_after(Duration::ZERO, job_id, song)
    }

    pub fn start_after(&self, delay: Duration, job_id: &str, song: &str) -> &Self {
        let started = StartedJob {
            job_id: JobId::from(job_id),
            track_name: song.to_string(),
            output_location: Some(format!("/srv/output/{song}")),
        };
        self.script.lock().unwrap().starts.push_back((delay, Reply::Ok(started)));
        self
    }

    pub fn start_fails(&self) -> &Self {
        self.script.lock().unwrap().starts.push_back((Duration::ZERO, Reply::Fail));
        self
    }

    pub fn statuses(&self, job_id: &str, replies: Vec<Reply<StatusReport>>) -> &Self {
        let replies = replies.into_iter().map(|r| (Duration::ZERO, r)).collect();
        self.script.lock().unwrap().statuses.insert(JobId::from(job_id), replies);
        self
    }

    /// Append one status answer that takes `delay` to arrive.
    pub fn status_after(&self, job_id: &str, delay: Duration, reply: Reply<StatusReport>) -> &Self {
        self.script
            .lock()
            .unwrap()
            .statuses
            .entry(JobId::from(job_id))
            .or_default()
            .push_back((delay, reply));
        self
    }

    pub fn files(&self, job_id: &str, reply: Reply<Vec<StemFile>>) -> &Self {
        self.script.lock().unwrap().files.insert(JobId::from(job_id), reply);
        self
    }

    pub fn set_queue(&self, reply: Reply<QueueSnapshot>) -> &Self {
        self.script.lock().unwrap().queue = Some(reply);
        self
    }

    pub fn set_completed(&self, records: Vec<CompletedRecord>) -> &Self {
        self.script.lock().unwrap().completed = records;
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    pub fn status_calls(&self, job_id: &str) -> usize {
        self.calls().status.get(&JobId::from(job_id)).copied().unwrap_or(0)
    }
}

#[async_trait]
impl StemService for FakeService {
    async fn start_job(&self, _request: &JobRequest) -> Result<StartedJob, ServiceError> {
        self.calls.lock().unwrap().starts += 1;
        let (delay, reply) = self
            .script
            .lock()
            .unwrap()
            .starts
            .pop_front()
            .unwrap_or((Duration::ZERO, Reply::Fail));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply.into_result("start")
    }

    async fn job_status(&self, job_id: &JobId) -> Result<StatusReport, ServiceError> {
        *self.calls.lock().unwrap().status.entry(job_id.clone()).or_default() += 1;
        let (delay, reply) = {
            let mut script = self.script.lock().unwrap();
            let replies = script.statuses.entry(job_id.clone()).or_default();
            let next = if replies.len() > 1 { replies.pop_front() } else { replies.front().cloned() };
            next.unwrap_or_else(|| (Duration::ZERO, status("queued")))
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply.into_result("status")
    }

    async fn list_files(&self, job_id: &JobId, _song_name: &str) -> Result<Vec<StemFile>, ServiceError> {
        self.calls.lock().unwrap().files += 1;
        let reply = self.script.lock().unwrap().files.get(job_id).cloned().unwrap_or(Reply::Fail);
        reply.into_result("files")
    }

    async fn queue(&self) -> Result<QueueSnapshot, ServiceError> {
        self.calls.lock().unwrap().queue += 1;
        let reply = self
            .script
            .lock()
            .unwrap()
            .queue
            .clone()
            .unwrap_or(Reply::Ok(QueueSnapshot::default()));
        reply.into_result("queue")
    }

    async fn completed(&self) -> Result<Vec<CompletedRecord>, ServiceError> {
        self.calls.lock().unwrap().completed += 1;
        Ok(self.script.lock().unwrap().completed.clone())
    }

    async fn remove_job(&self, job_id: &JobId) -> Result<(), ServiceError> {
        self.calls.lock().unwrap().removed.push(job_id.clone());
        let mut script = self.script.lock().unwrap();
        if let Some(Reply::Ok(snapshot)) = script.queue.as_mut() {
            snapshot.entries.retain(|e| &e.job_id != job_id);
        }
        Ok(())
    }

    async fn fetch_audio(&self, _url: &str) -> Result<Vec<u8>, ServiceError> {
        Err(ServiceError::status("download", 404))
    }

    async fn fetch_archive(&self, _job_id: &JobId, _song_name: &str) -> Result<Vec<u8>, ServiceError> {
        Ok(b"PK\x05\x06".to_vec())
    }
}

/// Default cadence: 500 ms polls, 150 ms reveal delay.
pub fn client(service: &Arc<FakeService>) -> StemClient<FakeService> {
    StemClient::new(Arc::clone(service), ClientConfig::default())
}

/// Let spawned tasks run without moving the paused clock far.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

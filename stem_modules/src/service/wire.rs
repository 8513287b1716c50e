// src/service/wire.rs

//! JSON shapes the server speaks, and their conversion into domain types.

use serde::{Deserialize, Deserializer};

use crate::job::{JobId, RemoteStatus, StartedJob, StemFile, TrackMeta};
use crate::observers::{CompletedRecord, QueueEntry, QueueSnapshot};
use crate::service::StatusReport;

/// `bpm` shows up as `"120.0"`, `120.0` or null depending on the server build.
fn display_string<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(de)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => non_empty(Some(s)),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
pub(crate) struct StartResponse {
    pub job_id: Option<String>,
    pub song_name: Option<String>,
    pub output_folder: Option<String>,
}

impl StartResponse {
    pub fn into_started(self) -> Result<StartedJob, &'static str> {
        match (non_empty(self.job_id), non_empty(self.song_name)) {
            (Some(id), Some(song)) => Ok(StartedJob {
                job_id: JobId::new(id),
                track_name: song,
                output_location: non_empty(self.output_folder),
            }),
            (None, _) => Err("missing job_id"),
            (_, None) => Err("missing song_name"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    pub status: String,
    #[serde(default, deserialize_with = "display_string")]
    pub bpm: Option<String>,
    #[serde(default, deserialize_with = "display_string")]
    pub key: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<StatusResponse> for StatusReport {
    fn from(raw: StatusResponse) -> Self {
        StatusReport {
            status: RemoteStatus::parse(&raw.status),
            meta: TrackMeta { tempo: raw.bpm, key: raw.key },
            error: non_empty(raw.error),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileEntry {
    pub url: String,
    #[serde(default)]
    pub name: String,
}

impl From<FileEntry> for StemFile {
    fn from(raw: FileEntry) -> Self {
        StemFile { url: raw.url, display_name: raw.name }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FilesResponse {
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueuedJob {
    pub job_id: String,
    #[serde(default)]
    pub name: String,
}

impl From<QueuedJob> for QueueEntry {
    fn from(raw: QueuedJob) -> Self {
        QueueEntry { job_id: JobId::new(raw.job_id), display_name: raw.name }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueueResponse {
    #[serde(default)]
    pub queue: Vec<QueuedJob>,
    #[serde(default)]
    pub current_job: Option<QueuedJob>,
}

impl From<QueueResponse> for QueueSnapshot {
    fn from(raw: QueueResponse) -> Self {
        QueueSnapshot {
            entries: raw.queue.into_iter().map(Into::into).collect(),
            current: raw.current_job.map(Into::into),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletedJob {
    pub job_id: String,
    pub song_name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "display_string")]
    pub bpm: Option<String>,
    #[serde(default, deserialize_with = "display_string")]
    pub key: Option<String>,
    #[serde(default)]
    pub stems: Vec<FileEntry>,
}

impl From<CompletedJob> for CompletedRecord {
    fn from(raw: CompletedJob) -> Self {
        CompletedRecord {
            job_id: JobId::new(raw.job_id),
            song_name: raw.song_name,
            source_url: non_empty(raw.url),
            meta: TrackMeta { tempo: raw.bpm, key: raw.key },
            stems: raw.stems.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletedResponse {
    #[serde(default)]
    pub completed: Vec<CompletedJob>,
}

// src/job/mod.rs

pub mod gateway;
pub mod poller;

pub use gateway::{JobRequest, JobSubmissionGateway, StartedJob};
pub use poller::JobStatusPoller;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Shown when the server reports `error` without a message.
pub const PROCESSING_ERROR_FALLBACK: &str = "An error occurred during processing";

/// Opaque job identifier handed out by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobMode {
    /// Download the source as a single mp3, no separation.
    #[serde(rename = "youtube")]
    SourceDownload,
    #[default]
    #[serde(rename = "stem")]
    StemSplit,
}

impl JobMode {
    /// Value of the `mode` form field.
    pub fn as_wire(&self) -> &'static str {
        match self {
            JobMode::SourceDownload => "youtube",
            JobMode::StemSplit => "stem",
        }
    }
}

impl FromStr for JobMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stem" | "stem-split" | "split" => Ok(JobMode::StemSplit),
            "youtube" | "source-download" | "download" => Ok(JobMode::SourceDownload),
            other => Err(format!("unknown mode '{other}' (expected 'stem' or 'youtube')")),
        }
    }
}

/// Non-terminal pipeline stages the server reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Downloading,
    Splitting,
    Separating,
    Cleaning,
}

/// A status string from `/status/{id}`, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Stage(Stage),
    Done,
    Error,
    /// Anything else (`queued`, `not_found`, ...). Never changes local state.
    Unrecognized(String),
}

impl RemoteStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "downloading" => RemoteStatus::Stage(Stage::Downloading),
            "splitting" => RemoteStatus::Stage(Stage::Splitting),
            "separating" => RemoteStatus::Stage(Stage::Separating),
            "cleaning" => RemoteStatus::Stage(Stage::Cleaning),
            "done" => RemoteStatus::Done,
            "error" => RemoteStatus::Error,
            other => RemoteStatus::Unrecognized(other.to_string()),
        }
    }
}

/// Musical metadata attached to a finished job. Kept as the server's display strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackMeta {
    pub tempo: Option<String>,
    pub key: Option<String>,
}

impl TrackMeta {
    pub fn is_empty(&self) -> bool {
        self.tempo.is_none() && self.key.is_none()
    }
}

/// One downloadable result file (a stem, or the full mix in download mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StemFile {
    pub url: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobPhase {
    Active(Stage),
    /// `files` stays `None` until the listing arrives (or if it never does).
    Done {
        meta: TrackMeta,
        files: Option<Vec<StemFile>>,
    },
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub track_name: String,
    pub source_url: String,
    pub mode: JobMode,
    pub output_location: Option<String>,
    pub phase: JobPhase,
}

impl Job {
    pub fn results(&self) -> Option<&[StemFile]> {
        match &self.phase {
            JobPhase::Done { files: Some(files), .. } => Some(files),
            _ => None,
        }
    }

    pub fn meta(&self) -> Option<&TrackMeta> {
        match &self.phase {
            JobPhase::Done { meta, .. } => Some(meta),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.phase {
            JobPhase::Failed { message } => Some(message),
            _ => None,
        }
    }
}

/// Flattened status for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Downloading,
    Splitting,
    Separating,
    Cleaning,
    Done,
    Error,
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Idle => "",
            JobStatus::Downloading => "Downloading",
            JobStatus::Splitting | JobStatus::Separating => "Splitting",
            JobStatus::Cleaning => "Processing",
            JobStatus::Done => "Complete",
            JobStatus::Error => "Error",
        }
    }
}

impl From<Stage> for JobStatus {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Downloading => JobStatus::Downloading,
            Stage::Splitting => JobStatus::Splitting,
            Stage::Separating => JobStatus::Separating,
            Stage::Cleaning => JobStatus::Cleaning,
        }
    }
}

/// Full mix (`*[full].mp3`) first, then stems by name.
pub fn sort_stems(stems: &mut [StemFile]) {
    stems.sort_by(|a, b| {
        let a_full = a.display_name.ends_with("[full].mp3");
        let b_full = b.display_name.ends_with("[full].mp3");
        b_full
            .cmp(&a_full)
            .then_with(|| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()))
    });
}

// src/lib.rs

pub mod audio;
pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod job;
pub mod observers;
pub mod playback;
mod player;
pub mod service;
pub mod session;
pub mod waveform;

pub use client::{Observers, StemClient};
pub use config::ClientConfig;
pub use error::{ServiceError, SubmitError};
pub use job::{Job, JobId, JobMode, JobPhase, JobRequest, JobStatus, StemFile, TrackMeta};
pub use playback::{PlaybackHandle, PlaybackRegistry, SilentTransport, Transport};
pub use player::AudioPlayer;
pub use service::{HttpStemService, StemService};
pub use session::{RevealedJob, Session, SessionState};
pub use waveform::WaveformEngine; // convenience

// src/config.rs

use std::time::Duration;

use crate::waveform::DEFAULT_PEAK_BUCKETS;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Knobs shared by the gateway, the pollers and the waveform engines.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub status_interval: Duration,
    pub queue_interval: Duration,
    pub completed_interval: Duration,
    /// Pause between storing results and revealing them (avoids a visual flash).
    pub reveal_delay: Duration,
    pub request_timeout: Duration,
    pub peak_buckets: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URL.to_string(),
            status_interval: Duration::from_millis(500),
            queue_interval: Duration::from_millis(500),
            completed_interval: Duration::from_millis(500),
            reveal_delay: Duration::from_millis(150),
            request_timeout: Duration::from_secs(10),
            peak_buckets: DEFAULT_PEAK_BUCKETS,
        }
    }
}

impl ClientConfig {
    /// Reads `STEM_SERVER_URL`, `STEM_POLL_INTERVAL_MS` and `STEM_PEAK_BUCKETS`.
    /// Anything missing or malformed keeps its default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("STEM_SERVER_URL") {
            if !url.trim().is_empty() {
                config.base_url = url.trim().trim_end_matches('/').to_string();
            }
        }

        if let Some(ms) = parse_var::<u64>("STEM_POLL_INTERVAL_MS").filter(|ms| *ms > 0) {
            let interval = Duration::from_millis(ms);
            config.status_interval = interval;
            config.queue_interval = interval;
            config.completed_interval = interval;
        }

        if let Some(buckets) = parse_var::<usize>("STEM_PEAK_BUCKETS").filter(|n| *n > 0) {
            config.peak_buckets = buckets;
        }

        config
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring malformed {name}={raw:?}, using default");
            None
        }
    }
}

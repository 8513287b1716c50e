// src/error.rs

use thiserror::Error;

/// Failure talking to the stem server. Pollers swallow these; only the
/// gateway turns one into something the user sees.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{endpoint} answered HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },
}

impl ServiceError {
    pub fn status(endpoint: impl Into<String>, status: u16) -> Self {
        Self::Status { endpoint: endpoint.into(), status }
    }

    pub fn malformed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed { endpoint: endpoint.into(), reason: reason.into() }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Failed to start conversion")]
    Rejected(#[source] ServiceError),

    /// A reset or a newer submission landed while the start request was in flight.
    #[error("submission superseded")]
    Superseded,
}

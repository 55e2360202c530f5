// SYNOID Narration Errors
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use thiserror::Error;

/// Everything that can go wrong while turning shot records into narration.
///
/// Only `Validation` aborts a job. The transport variants are interval-local:
/// the orchestrator degrades to the best text it has and moves on.
#[derive(Debug, Error)]
pub enum NarrationError {
    #[error("invalid analysis input: {0}")]
    Validation(String),

    #[error("transient transport failure: {0}")]
    TransientTransport(String),

    #[error("rate limited by rewrite service: {0}")]
    RateLimited(String),

    #[error("rewrite service rejected request (HTTP {status}): {body}")]
    RequestRejected { status: u16, body: String },

    #[error("malformed rewrite response: {0}")]
    MalformedResponse(String),

    #[error("job cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl NarrationError {
    /// Errors worth another attempt after a backoff or cooldown.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NarrationError::TransientTransport(_) | NarrationError::RateLimited(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NarrationError>;

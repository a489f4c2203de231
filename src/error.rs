#![forbid(unsafe_code)]

//! Error taxonomy shared by the ingestion pipeline and the HTTP layer.

use std::time::Duration;

use thiserror::Error;

/// Failure talking to the upstream video platform.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("YouTube API error: {status} - {body}")]
    Status { status: u16, body: String },
    #[error("YouTube API request failed: {0}")]
    Transport(String),
    #[error("YouTube API returned an unreadable payload: {0}")]
    Decode(String),
}

/// Why a single probe could not determine a video's dimensions.
#[derive(Debug, Error)]
pub enum ProbeCause {
    #[error("could not start inspector: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("inspector exited with status {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },
    #[error("could not parse inspector output: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
#[error("probe failed for {video_id}: {cause}")]
pub struct ProbeError {
    pub video_id: String,
    #[source]
    pub cause: ProbeCause,
}

/// Malformed request input, rejected before any upstream work.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("videoIds must be an array")]
    NotAnArray,
    #[error("invalid video id: {0:?}")]
    InvalidVideoId(String),
    /// `got` is the value as the client sent it, which may not be a number.
    #[error("batchSize must be between 1 and {max}, got {got}")]
    BatchSize { got: String, max: usize },
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Could not extract channel ID from URL")]
    Unresolvable,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

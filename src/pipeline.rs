#![forbid(unsafe_code)]

//! Batch ingestion: fetch metadata chunk by chunk, drop Shorts, and hand each
//! chunk's survivors to a [`RecordSink`] as soon as it is ready.
//!
//! Chunks are processed strictly one after another so batch numbers reach the
//! sink in ascending order. Inside a chunk every candidate is classified
//! concurrently; the shared [`Prober`](crate::prober::Prober) semaphore is the
//! only limit on probe parallelism.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::classifier::{ShortsClassifier, VideoCandidate};
use crate::duration::parse_duration;
use crate::error::{UpstreamError, ValidationError};
use crate::youtube::{MAX_IDS_PER_CALL, VideoItem, VideoPlatform};

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_STREAM_BATCH_SIZE: usize = 10;
pub const MAX_BATCH_SIZE: usize = MAX_IDS_PER_CALL;
const MAX_VIDEO_ID_LEN: usize = 64;

/// Final per-video shape delivered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedVideo {
    pub id: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub duration_display: String,
    pub url: String,
}

impl From<&VideoItem> for EnrichedVideo {
    fn from(item: &VideoItem) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title().to_string(),
            thumbnail_url: item.thumbnail_url().map(str::to_string),
            published_at: item
                .published_at()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|ts| ts.with_timezone(&Utc)),
            duration_display: parse_duration(item.duration_iso()).display,
            url: format!("https://www.youtube.com/watch?v={}", item.id),
        }
    }
}

/// One line of the streaming protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BatchRecord {
    #[serde(rename_all = "camelCase")]
    Batch {
        batch_number: usize,
        total_batches: usize,
        videos: Vec<EnrichedVideo>,
        processed_count: usize,
        total_processed: usize,
        total_to_process: usize,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        total_videos: usize,
        total_batches: usize,
    },
    Error { message: String },
}

impl BatchRecord {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Batch { .. })
    }
}

/// Receives records as the pipeline produces them. Returning `false` means
/// nobody is listening any more and no further chunks should be started.
#[async_trait]
pub trait RecordSink: Send {
    async fn emit(&mut self, record: BatchRecord) -> bool;
}

#[async_trait]
impl RecordSink for mpsc::Sender<BatchRecord> {
    async fn emit(&mut self, record: BatchRecord) -> bool {
        self.send(record).await.is_ok()
    }
}

#[async_trait]
impl RecordSink for Vec<BatchRecord> {
    async fn emit(&mut self, record: BatchRecord) -> bool {
        self.push(record);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total_videos: usize,
    pub total_batches: usize,
    /// False when the sink went away before the terminal record.
    pub completed: bool,
}

/// Survivors of one chunk, in input order.
struct ChunkOutcome {
    items: Vec<VideoItem>,
}

pub struct BatchPipeline {
    platform: Arc<dyn VideoPlatform>,
    classifier: ShortsClassifier,
}

impl BatchPipeline {
    pub fn new(platform: Arc<dyn VideoPlatform>, classifier: ShortsClassifier) -> Self {
        Self {
            platform,
            classifier,
        }
    }

    /// Streams `batch` records for every chunk followed by one terminal
    /// record. Upstream failures skip their chunk; invalid input produces a
    /// single `error` record.
    pub async fn run<S>(&self, video_ids: &[String], batch_size: usize, sink: &mut S) -> RunSummary
    where
        S: RecordSink + ?Sized,
    {
        if video_ids.is_empty() {
            let completed = sink
                .emit(BatchRecord::Complete {
                    total_videos: 0,
                    total_batches: 0,
                })
                .await;
            return RunSummary {
                total_videos: 0,
                total_batches: 0,
                completed,
            };
        }
        if let Err(err) = validate_request(video_ids, batch_size) {
            warn!(error = %err, "rejecting pipeline input");
            let delivered = sink
                .emit(BatchRecord::Error {
                    message: err.to_string(),
                })
                .await;
            return RunSummary {
                total_videos: 0,
                total_batches: 0,
                completed: delivered,
            };
        }

        let total_batches = video_ids.len().div_ceil(batch_size);
        let total_to_process = video_ids.len();
        let mut delivered = 0;
        let mut total_processed = 0;

        for (index, chunk) in video_ids.chunks(batch_size).enumerate() {
            let batch_number = index + 1;
            let videos: Vec<EnrichedVideo> = match self.process_chunk(chunk).await {
                Ok(outcome) => outcome.items.iter().map(EnrichedVideo::from).collect(),
                Err(err) => {
                    warn!(batch = batch_number, error = %err, "skipping chunk after upstream failure");
                    Vec::new()
                }
            };
            total_processed += chunk.len();
            delivered += videos.len();

            info!(
                batch = batch_number,
                total_batches,
                kept = videos.len(),
                processed = total_processed,
                "batch ready"
            );
            let record = BatchRecord::Batch {
                batch_number,
                total_batches,
                videos,
                processed_count: chunk.len(),
                total_processed,
                total_to_process,
            };
            if !sink.emit(record).await {
                info!(batch = batch_number, "receiver gone, stopping pipeline");
                return RunSummary {
                    total_videos: delivered,
                    total_batches,
                    completed: false,
                };
            }
        }

        let completed = sink
            .emit(BatchRecord::Complete {
                total_videos: delivered,
                total_batches,
            })
            .await;
        RunSummary {
            total_videos: delivered,
            total_batches,
            completed,
        }
    }

    /// Single-shot variant: returns the raw upstream items of every LongForm
    /// video. An upstream failure is fatal only while no chunk has succeeded.
    pub async fn filter_videos(
        &self,
        video_ids: &[String],
    ) -> Result<Vec<VideoItem>, PipelineError> {
        validate_request(video_ids, DEFAULT_BATCH_SIZE)?;

        let mut survivors = Vec::new();
        let mut any_succeeded = false;
        for (index, chunk) in video_ids.chunks(DEFAULT_BATCH_SIZE).enumerate() {
            match self.process_chunk(chunk).await {
                Ok(outcome) => {
                    any_succeeded = true;
                    survivors.extend(outcome.items);
                }
                Err(err) if !any_succeeded => return Err(err.into()),
                Err(err) => {
                    warn!(batch = index + 1, error = %err, "skipping chunk after upstream failure");
                }
            }
        }
        info!(
            requested = video_ids.len(),
            kept = survivors.len(),
            "filtered video metadata"
        );
        Ok(survivors)
    }

    async fn process_chunk(&self, chunk: &[String]) -> Result<ChunkOutcome, UpstreamError> {
        let fetched = self.platform.videos(chunk).await?;
        info!(requested = chunk.len(), returned = fetched.len(), "fetched chunk metadata");
        let ordered = order_like_input(chunk, fetched);

        let candidates: Vec<VideoCandidate> = ordered.iter().map(VideoCandidate::from).collect();
        let verdicts = join_all(
            candidates
                .iter()
                .map(|candidate| self.classifier.classify(candidate)),
        )
        .await;

        let mut shorts = 0;
        let items = ordered
            .into_iter()
            .zip(verdicts)
            .filter_map(|(item, verdict)| {
                debug!(
                    video_id = %item.id,
                    verdict = ?verdict.verdict,
                    evidence = ?verdict.evidence,
                    "classified video"
                );
                if verdict.is_short() {
                    shorts += 1;
                    None
                } else {
                    Some(item)
                }
            })
            .collect::<Vec<_>>();
        info!(shorts, kept = items.len(), "classified chunk");
        Ok(ChunkOutcome { items })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Rejects batch sizes the upstream cannot serve and ids that are not
/// platform identifiers.
pub fn validate_request(video_ids: &[String], batch_size: usize) -> Result<(), ValidationError> {
    if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
        return Err(ValidationError::BatchSize {
            got: batch_size.to_string(),
            max: MAX_BATCH_SIZE,
        });
    }
    if let Some(bad) = video_ids.iter().find(|id| !is_valid_video_id(id)) {
        return Err(ValidationError::InvalidVideoId(bad.clone()));
    }
    Ok(())
}

fn is_valid_video_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_VIDEO_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Upstream may reorder or omit ids; restore input order and drop the rest.
fn order_like_input(chunk: &[String], fetched: Vec<VideoItem>) -> Vec<VideoItem> {
    let mut by_id: HashMap<String, VideoItem> = fetched
        .into_iter()
        .map(|item| (item.id.clone(), item))
        .collect();
    chunk.iter().filter_map(|id| by_id.remove(id)).collect()
}

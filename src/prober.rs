#![forbid(unsafe_code)]

//! Authoritative short detection: asks an external media inspector
//! (`yt-dlp -j`) for a video's real pixel dimensions.
//!
//! The [`Prober`] is process-wide. It owns a TTL cache keyed by video id and a
//! FIFO semaphore that caps how many inspector processes run at once, no
//! matter how many pipeline runs are active. The per-call timeout only starts
//! once a permit has been acquired.

use std::{collections::HashMap, process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{process::Command, sync::Semaphore, time::Instant};
use tracing::{debug, info, warn};

use crate::error::{ProbeCause, ProbeError};

pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 5;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_YTDLP_PROGRAM: &str = "yt-dlp";

/// Raw pixel dimensions reported by an inspector. Either side may be unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct MediaDimensions {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub video_id: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub aspect_ratio: Option<f64>,
}

impl ProbeResult {
    pub fn from_dimensions(video_id: impl Into<String>, dims: MediaDimensions) -> Self {
        Self {
            video_id: video_id.into(),
            width: dims.width,
            height: dims.height,
            aspect_ratio: aspect_ratio(dims.width, dims.height),
        }
    }
}

/// width / height rounded to two decimals; `None` when either side is
/// missing or zero.
pub fn aspect_ratio(width: Option<u32>, height: Option<u32>) -> Option<f64> {
    match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => {
            Some((f64::from(w) / f64::from(h) * 100.0).round() / 100.0)
        }
        _ => None,
    }
}

/// Out-of-process tool that reports the dimensions of one video.
#[async_trait]
pub trait MediaInspector: Send + Sync {
    async fn inspect(&self, video_id: &str) -> Result<MediaDimensions, ProbeCause>;
}

/// Runs `yt-dlp -j --no-warnings --skip-download <watch url>`.
pub struct YtDlpInspector {
    program: String,
}

impl Default for YtDlpInspector {
    fn default() -> Self {
        Self::new(DEFAULT_YTDLP_PROGRAM)
    }
}

impl YtDlpInspector {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MediaInspector for YtDlpInspector {
    async fn inspect(&self, video_id: &str) -> Result<MediaDimensions, ProbeCause> {
        let url = format!("https://www.youtube.com/watch?v={video_id}");
        let output = Command::new(&self.program)
            .args(["-j", "--no-warnings", "--skip-download"])
            .arg(&url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropped by the timeout; don't leave the child behind.
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProbeCause::ExitStatus {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !output.stderr.is_empty() {
            warn!(
                video_id,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "yt-dlp wrote to stderr"
            );
        }
        parse_inspector_output(&output.stdout)
    }
}

/// Extracts width/height from a yt-dlp info JSON document.
pub fn parse_inspector_output(stdout: &[u8]) -> Result<MediaDimensions, ProbeCause> {
    Ok(serde_json::from_slice(stdout)?)
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: ProbeResult,
    inserted_at: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct ProberSettings {
    pub max_concurrent: usize,
    pub timeout: Duration,
    pub cache_ttl: Duration,
}

impl Default for ProberSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_PROBES,
            timeout: DEFAULT_PROBE_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

pub struct Prober {
    inspector: Arc<dyn MediaInspector>,
    permits: Semaphore,
    cache: Mutex<HashMap<String, CacheEntry>>,
    settings: ProberSettings,
}

impl Prober {
    pub fn new(inspector: Arc<dyn MediaInspector>, settings: ProberSettings) -> Self {
        Self {
            inspector,
            permits: Semaphore::new(settings.max_concurrent.max(1)),
            cache: Mutex::new(HashMap::new()),
            settings,
        }
    }

    /// Returns cached dimensions when fresh, otherwise runs the inspector
    /// under the global concurrency limit and caches the outcome.
    pub async fn probe(&self, video_id: &str) -> Result<ProbeResult, ProbeError> {
        if let Some(hit) = self.cached(video_id) {
            debug!(video_id, "probe cache hit");
            return Ok(hit);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .expect("probe semaphore is never closed");

        // Another caller may have finished the same id while we queued.
        if let Some(hit) = self.cached(video_id) {
            debug!(video_id, "probe cache hit after queueing");
            return Ok(hit);
        }

        info!(video_id, "running media inspector");
        let dims = match tokio::time::timeout(
            self.settings.timeout,
            self.inspector.inspect(video_id),
        )
        .await
        {
            Ok(Ok(dims)) => dims,
            Ok(Err(cause)) => return Err(self.failure(video_id, cause)),
            Err(_) => return Err(self.failure(video_id, ProbeCause::Timeout(self.settings.timeout))),
        };

        let result = ProbeResult::from_dimensions(video_id, dims);
        info!(
            video_id,
            width = ?result.width,
            height = ?result.height,
            aspect_ratio = ?result.aspect_ratio,
            "media inspected"
        );
        self.cache.lock().insert(
            video_id.to_string(),
            CacheEntry {
                result: result.clone(),
                inserted_at: Instant::now(),
            },
        );
        Ok(result)
    }

    /// Fresh entries only; stale ones are left in place until overwritten.
    fn cached(&self, video_id: &str) -> Option<ProbeResult> {
        let cache = self.cache.lock();
        let entry = cache.get(video_id)?;
        (entry.inserted_at.elapsed() < self.settings.cache_ttl).then(|| entry.result.clone())
    }

    fn failure(&self, video_id: &str, cause: ProbeCause) -> ProbeError {
        let err = ProbeError {
            video_id: video_id.to_string(),
            cause,
        };
        warn!(video_id, error = %err, "probe failed");
        err
    }
}

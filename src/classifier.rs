#![forbid(unsafe_code)]

//! Two-tier Shorts detection.
//!
//! The heuristic tier is free: anything at or under two minutes, or tagged
//! `#short(s)` in the title, is a Short. Only the survivors pay for a probe,
//! and a probe that cannot answer leaves the video visible (fail open).

use std::sync::Arc;

use crate::duration::try_parse_duration;
use crate::prober::Prober;
use crate::youtube::VideoItem;

pub const SHORT_MAX_SECONDS: u64 = 120;
/// Portrait-dominant below this width/height ratio.
pub const PORTRAIT_RATIO: f64 = 0.8;
const TITLE_MARKERS: [&str; 2] = ["#shorts", "#short"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCandidate {
    pub id: String,
    pub duration_iso: String,
    pub title: String,
}

impl From<&VideoItem> for VideoCandidate {
    fn from(item: &VideoItem) -> Self {
        Self {
            id: item.id.clone(),
            duration_iso: item.duration_iso().to_string(),
            title: item.title().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Short,
    LongForm,
}

/// What the verdict was based on.
#[derive(Debug, Clone, PartialEq)]
pub enum Evidence {
    Duration { seconds: u64 },
    TitleMarker,
    AspectRatio { ratio: f64 },
    NoDimensions,
    ProbeFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub verdict: Verdict,
    pub evidence: Evidence,
}

impl Classification {
    pub fn is_short(&self) -> bool {
        self.verdict == Verdict::Short
    }
}

/// Cheap data-only check. `Some` means the video is a Short.
///
/// Durations that are not of the `PT#H#M#S` form (live streams report `P0D`)
/// say nothing either way; only the title markers apply to them.
pub fn heuristic(candidate: &VideoCandidate) -> Option<Evidence> {
    let title = candidate.title.to_lowercase();
    if TITLE_MARKERS.iter().any(|marker| title.contains(marker)) {
        return Some(Evidence::TitleMarker);
    }
    let parsed = try_parse_duration(&candidate.duration_iso)?;
    (parsed.seconds <= SHORT_MAX_SECONDS).then_some(Evidence::Duration {
        seconds: parsed.seconds,
    })
}

pub struct ShortsClassifier {
    prober: Arc<Prober>,
}

impl ShortsClassifier {
    pub fn new(prober: Arc<Prober>) -> Self {
        Self { prober }
    }

    pub async fn classify(&self, candidate: &VideoCandidate) -> Classification {
        if let Some(evidence) = heuristic(candidate) {
            return Classification {
                verdict: Verdict::Short,
                evidence,
            };
        }

        match self.prober.probe(&candidate.id).await {
            Ok(result) => match result.aspect_ratio {
                Some(ratio) if ratio < PORTRAIT_RATIO => Classification {
                    verdict: Verdict::Short,
                    evidence: Evidence::AspectRatio { ratio },
                },
                Some(ratio) => Classification {
                    verdict: Verdict::LongForm,
                    evidence: Evidence::AspectRatio { ratio },
                },
                None => Classification {
                    verdict: Verdict::LongForm,
                    evidence: Evidence::NoDimensions,
                },
            },
            Err(err) => Classification {
                verdict: Verdict::LongForm,
                evidence: Evidence::ProbeFailed {
                    reason: err.cause.to_string(),
                },
            },
        }
    }
}

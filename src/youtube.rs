#![forbid(unsafe_code)]

//! Thin client for the YouTube Data API v3.
//!
//! Only the fields the pipeline actually reads are typed; every struct keeps
//! the remaining JSON in a flattened `extra` map so responses can be handed
//! back to callers without losing data. Missing fields deserialize to `None`
//! and are defaulted by the consumers (empty title, `0:00` duration, no
//! thumbnail).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::UpstreamError;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
/// The API refuses more than 50 ids (or results) per call.
pub const MAX_IDS_PER_CALL: usize = 50;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thumbnail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thumbnails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Thumbnail>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Thumbnails {
    /// Best available url: high, then medium, then default.
    pub fn best_url(&self) -> Option<&str> {
        [&self.high, &self.medium, &self.default]
            .into_iter()
            .flatten()
            .find_map(|thumb| thumb.url.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<Thumbnails>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of `videos?part=snippet,contentDetails`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoItem {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<VideoSnippet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_details: Option<ContentDetails>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VideoItem {
    pub fn title(&self) -> &str {
        self.snippet
            .as_ref()
            .and_then(|snippet| snippet.title.as_deref())
            .unwrap_or_default()
    }

    pub fn duration_iso(&self) -> &str {
        self.content_details
            .as_ref()
            .and_then(|details| details.duration.as_deref())
            .unwrap_or_default()
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        self.snippet
            .as_ref()
            .and_then(|snippet| snippet.thumbnails.as_ref())
            .and_then(Thumbnails::best_url)
    }

    pub fn published_at(&self) -> Option<&str> {
        self.snippet
            .as_ref()
            .and_then(|snippet| snippet.published_at.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<VideoItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchSnippet {
    #[serde(default)]
    channel_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SearchItem {
    #[serde(default)]
    snippet: Option<SearchSnippet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

/// Everything the service needs from the upstream platform. Raw passthrough
/// endpoints return untyped JSON; the pipeline path is typed.
#[async_trait]
pub trait VideoPlatform: Send + Sync {
    async fn channel(&self, channel_id: &str) -> Result<Value, UpstreamError>;

    /// Newest uploads of a channel via the search endpoint.
    async fn channel_videos(
        &self,
        channel_id: &str,
        max_results: u32,
    ) -> Result<Value, UpstreamError>;

    async fn playlist(&self, playlist_id: &str) -> Result<Value, UpstreamError>;

    async fn playlist_items(
        &self,
        playlist_id: &str,
        max_results: u32,
    ) -> Result<Value, UpstreamError>;

    /// `contentDetails` only, used by clients for duration lookups.
    async fn content_details(&self, video_ids: &[String]) -> Result<Value, UpstreamError>;

    /// Snippet and content details for at most [`MAX_IDS_PER_CALL`] ids.
    async fn videos(&self, video_ids: &[String]) -> Result<Vec<VideoItem>, UpstreamError>;

    /// First channel id returned by a channel search, if any.
    async fn search_channel(&self, query: &str) -> Result<Option<String>, UpstreamError>;
}

#[derive(Clone)]
pub struct YouTubeClient {
    agent: ureq::Agent,
    api_key: String,
    base_url: String,
}

impl YouTubeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_API_BASE)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Runs one blocking GET on the blocking pool and decodes the body.
    async fn get_json<T>(
        &self,
        resource: &'static str,
        params: Vec<(&'static str, String)>,
    ) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let agent = self.agent.clone();
        let url = format!("{}/{}", self.base_url, resource);
        let api_key = self.api_key.clone();
        debug!(resource, "calling YouTube API");

        tokio::task::spawn_blocking(move || {
            let mut request = agent.get(&url);
            for (key, value) in &params {
                request = request.query(key, value);
            }
            request = request.query("key", &api_key);

            match request.call() {
                Ok(response) => response
                    .into_json::<T>()
                    .map_err(|err| UpstreamError::Decode(err.to_string())),
                Err(ureq::Error::Status(status, response)) => Err(UpstreamError::Status {
                    status,
                    body: response.into_string().unwrap_or_default(),
                }),
                Err(ureq::Error::Transport(transport)) => {
                    Err(UpstreamError::Transport(transport.to_string()))
                }
            }
        })
        .await
        .map_err(|err| UpstreamError::Transport(format!("request task failed: {err}")))?
    }
}

#[async_trait]
impl VideoPlatform for YouTubeClient {
    async fn channel(&self, channel_id: &str) -> Result<Value, UpstreamError> {
        self.get_json(
            "channels",
            vec![("part", "snippet".into()), ("id", channel_id.to_string())],
        )
        .await
    }

    async fn channel_videos(
        &self,
        channel_id: &str,
        max_results: u32,
    ) -> Result<Value, UpstreamError> {
        self.get_json(
            "search",
            vec![
                ("part", "snippet".into()),
                ("channelId", channel_id.to_string()),
                ("maxResults", max_results.to_string()),
                ("order", "date".into()),
                ("type", "video".into()),
            ],
        )
        .await
    }

    async fn playlist(&self, playlist_id: &str) -> Result<Value, UpstreamError> {
        self.get_json(
            "playlists",
            vec![
                ("part", "snippet,contentDetails".into()),
                ("id", playlist_id.to_string()),
            ],
        )
        .await
    }

    async fn playlist_items(
        &self,
        playlist_id: &str,
        max_results: u32,
    ) -> Result<Value, UpstreamError> {
        self.get_json(
            "playlistItems",
            vec![
                ("part", "snippet".into()),
                ("playlistId", playlist_id.to_string()),
                ("maxResults", max_results.to_string()),
            ],
        )
        .await
    }

    async fn content_details(&self, video_ids: &[String]) -> Result<Value, UpstreamError> {
        self.get_json(
            "videos",
            vec![
                ("part", "contentDetails".into()),
                ("id", video_ids.join(",")),
            ],
        )
        .await
    }

    async fn videos(&self, video_ids: &[String]) -> Result<Vec<VideoItem>, UpstreamError> {
        let response: VideoListResponse = self
            .get_json(
                "videos",
                vec![
                    ("part", "snippet,contentDetails".into()),
                    ("id", video_ids.join(",")),
                ],
            )
            .await?;
        Ok(response.items)
    }

    async fn search_channel(&self, query: &str) -> Result<Option<String>, UpstreamError> {
        let response: SearchListResponse = self
            .get_json(
                "search",
                vec![
                    ("part", "snippet".into()),
                    ("type", "channel".into()),
                    ("q", query.to_string()),
                    ("maxResults", "1".into()),
                ],
            )
            .await?;
        Ok(first_channel_id(response))
    }
}

fn first_channel_id(response: SearchListResponse) -> Option<String> {
    response
        .items
        .into_iter()
        .next()
        .and_then(|item| item.snippet)
        .and_then(|snippet| snippet.channel_id)
        .filter(|id| !id.is_empty())
}

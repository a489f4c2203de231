#![forbid(unsafe_code)]

//! Axum backend that proxies the YouTube Data API for the tracker UI and
//! filters Shorts out of every video list it returns.
//!
//! The raw passthrough routes exist so the browser never sees the API key.
//! The two `videos/metadata` routes run the full ingestion pipeline: the plain
//! one blocks until everything is classified, the `stream` one answers with
//! NDJSON so the UI can render batch by batch.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path as AxumPath, Query, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::{signal, sync::mpsc};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tube_tracker::{
    classifier::ShortsClassifier,
    config::{RuntimeOverrides, resolve_runtime_settings},
    error::{ResolutionError, UpstreamError, ValidationError},
    pipeline::{
        BatchPipeline, BatchRecord, DEFAULT_STREAM_BATCH_SIZE, MAX_BATCH_SIZE, PipelineError,
        RecordSink, validate_request,
    },
    prober::{Prober, YtDlpInspector},
    resolver::{ResolvedContent, resolve_content},
    stream::{NDJSON_CONTENT_TYPE, ndjson_body},
    youtube::{MAX_IDS_PER_CALL, VideoItem, VideoPlatform, YouTubeClient},
};

const API_PREFIX: &str = "/api/youtube";
const DEFAULT_MAX_RESULTS: u32 = 6;
// Channel search over-fetches so enough videos survive Shorts filtering.
const CHANNEL_OVERFETCH_FACTOR: u32 = 4;
const STREAM_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Clone, Parser)]
#[command(name = "backend", about = "YouTube tracker API proxy with Shorts filtering")]
struct BackendArgs {
    /// Port to listen on (overrides PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Address to bind (overrides HOST).
    #[arg(long)]
    host: Option<String>,
    /// Path of the .env file to read.
    #[arg(long = "env-file")]
    env_file: Option<PathBuf>,
    /// yt-dlp executable used for aspect-ratio probes (overrides YTDLP_PATH).
    #[arg(long)]
    ytdlp: Option<String>,
}

impl BackendArgs {
    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            port: self.port,
            host: self.host.clone(),
            ytdlp_program: self.ytdlp.clone(),
            env_path: self.env_file.clone(),
        }
    }
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/HOST")
}

/// Shared state injected into every Axum handler.
///
/// * `platform` talks to the YouTube Data API (passthrough routes).
/// * `pipeline` owns the classifier and, through it, the process-wide probe
///   cache and concurrency limit.
#[derive(Clone)]
struct AppState {
    platform: Arc<dyn VideoPlatform>,
    pipeline: Arc<BatchPipeline>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        error!(error = %err, "upstream request failed");
        Self::internal(err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<ResolutionError> for ApiError {
    fn from(err: ResolutionError) -> Self {
        warn!(error = %err, "could not resolve content");
        Self::internal(err.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(err) => err.into(),
            PipelineError::Upstream(err) => err.into(),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = BackendArgs::parse();
    let settings =
        resolve_runtime_settings(args.overrides()).context("loading runtime settings")?;
    let host = parse_host_arg(&settings.host)?;

    let platform: Arc<dyn VideoPlatform> = Arc::new(YouTubeClient::new(settings.api_key.clone()));
    let inspector = Arc::new(YtDlpInspector::new(settings.ytdlp_program.clone()));
    let prober = Arc::new(Prober::new(inspector, settings.prober));
    let pipeline = BatchPipeline::new(platform.clone(), ShortsClassifier::new(prober));

    let state = AppState {
        platform,
        pipeline: Arc::new(pipeline),
    };
    let app = router(state);

    let addr = SocketAddr::new(host, settings.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!(
        %addr,
        max_concurrent_probes = settings.prober.max_concurrent,
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/extract-channel-id", post(extract_channel_id))
        .route("/channel/{id}", get(get_channel))
        .route("/channel/{id}/videos", get(get_channel_videos))
        .route("/playlist/{id}", get(get_playlist))
        .route("/playlist/{id}/videos", get(get_playlist_videos))
        .route("/videos/metadata", post(videos_metadata))
        .route("/videos/metadata/stream", post(videos_metadata_stream))
        .route("/videos/{ids}", get(get_video_details))
        .with_state(state);

    Router::new()
        .nest(API_PREFIX, api)
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on this; Ctrl+C still terminates.
    if let Err(err) = signal::ctrl_c().await {
        error!(error = %err, "failed to install Ctrl+C handler");
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "OK", "message": "YouTube API proxy is running" }))
}

#[derive(Deserialize)]
struct ExtractRequest {
    url: String,
}

async fn extract_channel_id(
    State(state): State<AppState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> ApiResult<Json<ResolvedContent>> {
    let Json(payload) = payload.map_err(|_| ApiError::bad_request("url must be a string"))?;
    let resolved = resolve_content(state.platform.as_ref(), &payload.url).await?;
    Ok(Json(resolved))
}

async fn get_channel(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<Value>> {
    Ok(Json(state.platform.channel(&id).await?))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    max_results: Option<u32>,
}

impl ListQuery {
    fn max_results(&self) -> u32 {
        self.max_results
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_IDS_PER_CALL as u32)
    }
}

/// Raw search results; the caller still has to run them through
/// `videos/metadata` to drop Shorts.
async fn get_channel_videos(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let request_count = overfetch_count(query.max_results());
    info!(channel_id = %id, request_count, "fetching channel videos");
    Ok(Json(state.platform.channel_videos(&id, request_count).await?))
}

fn overfetch_count(max_results: u32) -> u32 {
    max_results
        .saturating_mul(CHANNEL_OVERFETCH_FACTOR)
        .min(MAX_IDS_PER_CALL as u32)
}

async fn get_playlist(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<Value>> {
    Ok(Json(state.platform.playlist(&id).await?))
}

async fn get_playlist_videos(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    Ok(Json(
        state
            .platform
            .playlist_items(&id, query.max_results())
            .await?,
    ))
}

async fn get_video_details(
    State(state): State<AppState>,
    AxumPath(ids): AxumPath<String>,
) -> ApiResult<Json<Value>> {
    let ids: Vec<String> = ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    if ids.is_empty() || ids.len() > MAX_IDS_PER_CALL {
        return Err(ApiError::bad_request(format!(
            "expected between 1 and {MAX_IDS_PER_CALL} video ids"
        )));
    }
    validate_request(&ids, MAX_IDS_PER_CALL)?;
    Ok(Json(state.platform.content_details(&ids).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataRequest {
    video_ids: Vec<String>,
}

#[derive(Serialize)]
struct MetadataResponse {
    items: Vec<VideoItem>,
}

async fn videos_metadata(
    State(state): State<AppState>,
    payload: Result<Json<MetadataRequest>, JsonRejection>,
) -> ApiResult<Json<MetadataResponse>> {
    let Json(payload) = payload.map_err(|_| ApiError::from(ValidationError::NotAnArray))?;
    if payload.video_ids.is_empty() {
        return Ok(Json(MetadataResponse { items: Vec::new() }));
    }
    info!(count = payload.video_ids.len(), "filtering video metadata");
    let items = state.pipeline.filter_videos(&payload.video_ids).await?;
    Ok(Json(MetadataResponse { items }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamRequest {
    video_ids: Vec<String>,
    // Kept loose so a malformed value is reported in-band, not as a 400.
    batch_size: Option<Value>,
    channel_id: Option<Value>,
}

/// Missing means the default; anything that is not a non-negative integer is
/// rejected with the raw value in the message.
fn stream_batch_size(raw: Option<&Value>) -> Result<usize, ValidationError> {
    let Some(raw) = raw.filter(|value| !value.is_null()) else {
        return Ok(DEFAULT_STREAM_BATCH_SIZE);
    };
    raw.as_u64()
        .and_then(|value| usize::try_from(value).ok())
        .ok_or_else(|| ValidationError::BatchSize {
            got: raw.to_string(),
            max: MAX_BATCH_SIZE,
        })
}

/// Runs the pipeline in its own task and relays every record as one NDJSON
/// line. Dropping the response (client gone) closes the channel, which stops
/// the pipeline before its next chunk.
async fn videos_metadata_stream(
    State(state): State<AppState>,
    payload: Result<Json<StreamRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(payload) = payload.map_err(|_| ApiError::from(ValidationError::NotAnArray))?;
    let channel_id = payload
        .channel_id
        .as_ref()
        .and_then(Value::as_str)
        .unwrap_or("-")
        .to_string();

    let (mut tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    // An unusable batch size only matters when there is something to batch.
    let batch_size = match stream_batch_size(payload.batch_size.as_ref()) {
        Ok(size) => size,
        Err(_) if payload.video_ids.is_empty() => DEFAULT_STREAM_BATCH_SIZE,
        Err(err) => {
            warn!(%channel_id, error = %err, "rejecting streamed metadata run");
            tx.emit(BatchRecord::Error {
                message: err.to_string(),
            })
            .await;
            return Ok(ndjson_response(rx));
        }
    };
    info!(
        count = payload.video_ids.len(),
        batch_size,
        %channel_id,
        "starting streamed metadata run"
    );

    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        let summary = pipeline
            .run(&payload.video_ids, batch_size, &mut tx)
            .await;
        info!(
            %channel_id,
            total_videos = summary.total_videos,
            total_batches = summary.total_batches,
            completed = summary.completed,
            "streamed metadata run finished"
        );
    });

    Ok(ndjson_response(rx))
}

fn ndjson_response(records: mpsc::Receiver<BatchRecord>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(NDJSON_CONTENT_TYPE),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    (headers, ndjson_body(records)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;
    use tower::ServiceExt;
    use tube_tracker::{
        error::ProbeCause,
        prober::{MediaDimensions, MediaInspector, ProberSettings},
        stream::read_records,
    };

    #[derive(Default)]
    struct TestPlatform {
        items: HashMap<String, Value>,
        fail_videos: bool,
    }

    impl TestPlatform {
        fn with_video(mut self, id: &str, duration: &str, title: &str) -> Self {
            self.items.insert(
                id.to_string(),
                json!({
                    "kind": "youtube#video",
                    "id": id,
                    "snippet": { "title": title, "publishedAt": "2024-01-02T03:04:05Z" },
                    "contentDetails": { "duration": duration }
                }),
            );
            self
        }
    }

    #[async_trait]
    impl VideoPlatform for TestPlatform {
        async fn channel(&self, channel_id: &str) -> Result<Value, UpstreamError> {
            Ok(json!({ "items": [{ "id": channel_id, "snippet": { "title": "Chan" } }] }))
        }

        async fn channel_videos(
            &self,
            channel_id: &str,
            max_results: u32,
        ) -> Result<Value, UpstreamError> {
            Ok(json!({ "channelId": channel_id, "requested": max_results }))
        }

        async fn playlist(&self, playlist_id: &str) -> Result<Value, UpstreamError> {
            Ok(json!({ "items": [{ "id": playlist_id }] }))
        }

        async fn playlist_items(
            &self,
            playlist_id: &str,
            max_results: u32,
        ) -> Result<Value, UpstreamError> {
            Ok(json!({ "playlistId": playlist_id, "requested": max_results }))
        }

        async fn content_details(&self, video_ids: &[String]) -> Result<Value, UpstreamError> {
            Ok(json!({ "ids": video_ids }))
        }

        async fn videos(&self, video_ids: &[String]) -> Result<Vec<VideoItem>, UpstreamError> {
            if self.fail_videos {
                return Err(UpstreamError::Status {
                    status: 403,
                    body: "quotaExceeded".into(),
                });
            }
            Ok(video_ids
                .iter()
                .filter_map(|id| self.items.get(id))
                .map(|raw| serde_json::from_value(raw.clone()).unwrap())
                .collect())
        }

        async fn search_channel(&self, query: &str) -> Result<Option<String>, UpstreamError> {
            Ok((query == "creator").then(|| "UCcreator".to_string()))
        }
    }

    #[derive(Default)]
    struct TestInspector {
        portrait: HashSet<String>,
        failing: HashSet<String>,
    }

    #[async_trait]
    impl MediaInspector for TestInspector {
        async fn inspect(&self, video_id: &str) -> Result<MediaDimensions, ProbeCause> {
            if self.failing.contains(video_id) {
                return Err(ProbeCause::Timeout(Duration::from_secs(30)));
            }
            let (width, height) = if self.portrait.contains(video_id) {
                (1080, 1920)
            } else {
                (1920, 1080)
            };
            Ok(MediaDimensions {
                width: Some(width),
                height: Some(height),
            })
        }
    }

    fn app(platform: TestPlatform, inspector: TestInspector) -> Router {
        let platform: Arc<dyn VideoPlatform> = Arc::new(platform);
        let prober = Arc::new(Prober::new(Arc::new(inspector), ProberSettings::default()));
        router(AppState {
            platform: platform.clone(),
            pipeline: Arc::new(BatchPipeline::new(platform, ShortsClassifier::new(prober))),
        })
    }

    fn fixture() -> (TestPlatform, TestInspector) {
        let platform = TestPlatform::default()
            .with_video("aaa", "PT12M", "Long one")
            .with_video("bbb", "PT59S", "Tiny")
            .with_video("ccc", "PT8M", "Probe fails")
            .with_video("ddd", "PT20M", "Long two")
            .with_video("eee", "PT5M", "Vertical")
            .with_video("fff", "PT7M", "Clip #shorts");
        let inspector = TestInspector {
            portrait: HashSet::from(["eee".to_string()]),
            failing: HashSet::from(["ccc".to_string()]),
        };
        (platform, inspector)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn stream_records(response: Response) -> Vec<BatchRecord> {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        read_records(&body[..]).await.unwrap()
    }

    #[test]
    fn backend_args_parse_overrides() {
        let args = BackendArgs::try_parse_from([
            "backend",
            "--port",
            "4000",
            "--host",
            "0.0.0.0",
            "--env-file",
            "/etc/tracker.env",
            "--ytdlp",
            "/usr/local/bin/yt-dlp",
        ])
        .unwrap();
        let overrides = args.overrides();
        assert_eq!(overrides.port, Some(4000));
        assert_eq!(overrides.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(overrides.env_path, Some(PathBuf::from("/etc/tracker.env")));
        assert_eq!(overrides.ytdlp_program.as_deref(), Some("/usr/local/bin/yt-dlp"));
    }

    #[test]
    fn backend_args_reject_bad_port() {
        assert!(BackendArgs::try_parse_from(["backend", "--port", "nope"]).is_err());
        assert!(parse_host_arg("not-an-ip").is_err());
    }

    #[test]
    fn overfetch_is_capped_at_page_limit() {
        assert_eq!(overfetch_count(6), 24);
        assert_eq!(overfetch_count(20), 50);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app(TestPlatform::default(), TestInspector::default())
            .oneshot(Request::get("/api/youtube/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "OK");
    }

    #[tokio::test]
    async fn extract_channel_id_handles_playlists_and_handles() {
        let app = app(TestPlatform::default(), TestInspector::default());

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/youtube/extract-channel-id",
                json!({ "url": "https://www.youtube.com/playlist?list=PL123" }),
            ))
            .await
            .unwrap();
        assert_eq!(
            json_body(response).await,
            json!({ "playlistId": "PL123", "type": "playlist" })
        );

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/youtube/extract-channel-id",
                json!({ "url": "https://www.youtube.com/@creator" }),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({ "channelId": "UCcreator" }));

        let response = app
            .oneshot(post_json(
                "/api/youtube/extract-channel-id",
                json!({ "url": "https://example.com/nothing" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn channel_videos_overfetch() {
        let response = app(TestPlatform::default(), TestInspector::default())
            .oneshot(
                Request::get("/api/youtube/channel/UCx/videos?maxResults=3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(json_body(response).await["requested"], 12);
    }

    #[tokio::test]
    async fn metadata_filters_shorts_preserving_order() {
        let (platform, inspector) = fixture();
        let response = app(platform, inspector)
            .oneshot(post_json(
                "/api/youtube/videos/metadata",
                json!({ "videoIds": ["aaa", "bbb", "ccc", "ddd", "eee", "fff"] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let ids: Vec<&str> = body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["aaa", "ccc", "ddd"]);
        assert_eq!(body["items"][0]["kind"], "youtube#video");
    }

    #[tokio::test]
    async fn metadata_rejects_non_array() {
        let response = app(TestPlatform::default(), TestInspector::default())
            .oneshot(post_json(
                "/api/youtube/videos/metadata",
                json!({ "videoIds": "aaa" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "videoIds must be an array");
    }

    #[tokio::test]
    async fn metadata_empty_list_is_empty_items() {
        let response = app(TestPlatform::default(), TestInspector::default())
            .oneshot(post_json("/api/youtube/videos/metadata", json!({ "videoIds": [] })))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({ "items": [] }));
    }

    #[tokio::test]
    async fn metadata_upstream_failure_is_500() {
        let platform = TestPlatform {
            fail_videos: true,
            ..TestPlatform::default()
        };
        let response = app(platform, TestInspector::default())
            .oneshot(post_json(
                "/api/youtube/videos/metadata",
                json!({ "videoIds": ["aaa"] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("403"));
    }

    #[tokio::test]
    async fn stream_emits_ndjson_batches() {
        let (platform, inspector) = fixture();
        let response = app(platform, inspector)
            .oneshot(post_json(
                "/api/youtube/videos/metadata/stream",
                json!({
                    "videoIds": ["aaa", "bbb", "ccc", "ddd", "eee", "fff"],
                    "batchSize": 4,
                    "channelId": "UCx"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            NDJSON_CONTENT_TYPE
        );

        let records = stream_records(response).await;
        assert_eq!(records.len(), 3);
        let BatchRecord::Batch {
            batch_number,
            videos,
            ..
        } = &records[0]
        else {
            panic!("expected batch record");
        };
        assert_eq!(*batch_number, 1);
        let ids: Vec<&str> = videos.iter().map(|video| video.id.as_str()).collect();
        assert_eq!(ids, vec!["aaa", "ccc", "ddd"]);
        assert!(matches!(records[1], BatchRecord::Batch { batch_number: 2, .. }));
        assert_eq!(
            records[2],
            BatchRecord::Complete {
                total_videos: 3,
                total_batches: 2
            }
        );
    }

    #[tokio::test]
    async fn stream_of_nothing_is_one_complete_record() {
        let response = app(TestPlatform::default(), TestInspector::default())
            .oneshot(post_json(
                "/api/youtube/videos/metadata/stream",
                json!({ "videoIds": [] }),
            ))
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            std::str::from_utf8(&body).unwrap(),
            "{\"type\":\"complete\",\"totalVideos\":0,\"totalBatches\":0}\n"
        );
    }

    #[tokio::test]
    async fn stream_reports_invalid_batch_size_in_band() {
        let response = app(TestPlatform::default(), TestInspector::default())
            .oneshot(post_json(
                "/api/youtube/videos/metadata/stream",
                json!({ "videoIds": ["aaa"], "batchSize": 500 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let records = stream_records(response).await;
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], BatchRecord::Error { .. }));
    }

    #[tokio::test]
    async fn stream_reports_malformed_batch_size_in_band() {
        let app = app(TestPlatform::default(), TestInspector::default());
        for (batch_size, shown) in [
            (json!(-1), "-1"),
            (json!("10"), "\"10\""),
            (json!(2.5), "2.5"),
            (json!(0), "0"),
        ] {
            let response = app
                .clone()
                .oneshot(post_json(
                    "/api/youtube/videos/metadata/stream",
                    json!({ "videoIds": ["aaa"], "batchSize": batch_size, "channelId": 7 }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                NDJSON_CONTENT_TYPE
            );
            let records = stream_records(response).await;
            assert_eq!(
                records,
                vec![BatchRecord::Error {
                    message: format!("batchSize must be between 1 and 50, got {shown}")
                }]
            );
        }
    }

    #[tokio::test]
    async fn stream_of_nothing_ignores_batch_size() {
        let app = app(TestPlatform::default(), TestInspector::default());
        for batch_size in [json!(0), json!(-1), json!("x")] {
            let response = app
                .clone()
                .oneshot(post_json(
                    "/api/youtube/videos/metadata/stream",
                    json!({ "videoIds": [], "batchSize": batch_size }),
                ))
                .await
                .unwrap();
            assert_eq!(
                stream_records(response).await,
                vec![BatchRecord::Complete {
                    total_videos: 0,
                    total_batches: 0
                }]
            );
        }
    }

    #[test]
    fn stream_batch_size_defaults_when_absent() {
        assert_eq!(stream_batch_size(None), Ok(DEFAULT_STREAM_BATCH_SIZE));
        assert_eq!(stream_batch_size(Some(&Value::Null)), Ok(DEFAULT_STREAM_BATCH_SIZE));
        assert_eq!(stream_batch_size(Some(&json!(25))), Ok(25));
    }

    #[tokio::test]
    async fn video_details_validates_ids() {
        let app = app(TestPlatform::default(), TestInspector::default());
        let response = app
            .clone()
            .oneshot(Request::get("/api/youtube/videos/aaa,bbb").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({ "ids": ["aaa", "bbb"] }));

        let response = app
            .oneshot(Request::get("/api/youtube/videos/a%26key").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn api_error_serializes_json() {
        let response = ApiError::bad_request("missing").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "missing");
    }
}

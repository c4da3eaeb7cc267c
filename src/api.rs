// --- HTTP surface -----------------------------------------------------------
//
//   GET    /api/v1/stream                 push channel (text/event-stream)
//   GET    /api/v1/status                 timeline + poll health snapshot
//   POST   /api/v1/audio/reload           reload signal for the resolver
//   GET    /api/v1/audio/files            assets in the current resolver snapshot
//   GET    /api/v1/mappings               mapping table
//   PUT    /api/v1/mappings/:sequence     set mapping {"audioFile": "..."}
//   DELETE /api/v1/mappings/:sequence     remove mapping
//   GET    /audio/*                       audio assets for listeners
//
// Authentication is left to the reverse proxy in front of the engine.

use std::{convert::Infallible, path::Path, sync::Arc};

use axum::{
    extract::{Path as UrlPath, State},
    http::{header, HeaderName},
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
    routing::{get, post, put},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::services::ServeDir;

use crate::{
    error::ApiError,
    hub::{BroadcastHub, Frame},
    mapping::MappingEntry,
    poller::PollHealth,
    resolver::{AudioResolver, ReloadSummary},
    timeline::{Clock, TimelineState},
};

#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub hub: Arc<BroadcastHub>,
    pub resolver: Arc<AudioResolver>,
    pub poll_health: Arc<Mutex<PollHealth>>,
    pub clock: Arc<dyn Clock>,
}

pub fn build_router(state: AppState, audio_dir: &Path) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(|| async { "OK" }))
        .route("/api/v1/stream", get(stream))
        .route("/api/v1/status", get(status))
        .route("/api/v1/audio/reload", post(reload))
        .route("/api/v1/audio/files", get(audio_files))
        .route("/api/v1/mappings", get(list_mappings))
        .route(
            "/api/v1/mappings/:sequence",
            put(set_mapping).delete(delete_mapping),
        )
        .nest_service("/audio", ServeDir::new(audio_dir))
        .with_state(state)
}

async fn root() -> &'static str {
    "ShowSync engine is running. Listeners connect to /api/v1/stream"
}

/// Long-lived push channel. The first frame is the current timeline state.
async fn stream(State(state): State<AppState>) -> impl IntoResponse {
    let sub = state.hub.register().await;

    let events = futures::stream::unfold(sub, |mut sub| async move {
        let event = match sub.recv().await? {
            Frame::State(json) => Event::default().data(&*json),
            Frame::KeepAlive => Event::default().comment("keep-alive"),
        };
        Some((Ok::<_, Infallible>(event), sub))
    });

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events),
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    version: String,
    timeline: TimelineState,
    target_position: f64,
    listeners: usize,
    poll: PollHealth,
    audio_files: usize,
    mappings: usize,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let timeline = state.hub.current().await;
    let snapshot = state.resolver.snapshot();
    Json(StatusResponse {
        version: state.version.clone(),
        target_position: timeline.target_position(state.clock.now_ms()),
        timeline,
        listeners: state.hub.listener_count(),
        poll: state.poll_health.lock().clone(),
        audio_files: snapshot.file_count(),
        mappings: snapshot.mapping_count(),
    })
}

async fn reload(State(state): State<AppState>) -> Result<Json<ReloadSummary>, ApiError> {
    Ok(Json(state.resolver.reload().await?))
}

async fn audio_files(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.resolver.snapshot();
    let files: Vec<&str> = snapshot.files().collect();
    Json(json!({ "files": files }))
}

async fn list_mappings(
    State(state): State<AppState>,
) -> Result<Json<Vec<MappingEntry>>, ApiError> {
    Ok(Json(state.resolver.store().list().await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetMappingReq {
    audio_file: String,
}

async fn set_mapping(
    State(state): State<AppState>,
    UrlPath(sequence): UrlPath<String>,
    Json(req): Json<SetMappingReq>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sequence = sequence.trim().to_string();
    let audio_file = req.audio_file.trim().to_string();
    if sequence.is_empty() || audio_file.is_empty() {
        return Err(ApiError::BadRequest(
            "sequence and audioFile must not be empty".into(),
        ));
    }

    state.resolver.store().upsert(&sequence, &audio_file).await?;
    reload_after_write(&state).await;

    Ok(Json(json!({"ok": true})))
}

async fn delete_mapping(
    State(state): State<AppState>,
    UrlPath(sequence): UrlPath<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.resolver.store().remove(sequence.trim()).await? {
        return Err(ApiError::NotFound(format!("no mapping for {sequence:?}")));
    }
    reload_after_write(&state).await;

    Ok(Json(json!({"ok": true})))
}

// The write already succeeded; a failed rescan leaves the previous snapshot
// in place until the next reload signal.
async fn reload_after_write(state: &AppState) {
    if let Err(e) = state.resolver.reload().await {
        tracing::warn!("resolver reload after mapping change failed: {e}");
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Startup configuration problems. These abort the process.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is not valid: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Failures talking to the show-control device.
///
/// The poller swallows all of these; they only ever reach the log.
#[derive(Debug, thiserror::Error)]
pub enum ShowControlError {
    #[error("status request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("status endpoint returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("status payload could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The listener's media element refused an operation (autoplay policy, decode error).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("playback was not allowed: {0}")]
    NotAllowed(String),
    #[error("media could not be decoded: {0}")]
    Decode(String),
}

/// Push-channel failures seen from the listener side.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("push channel request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("push channel returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("push channel closed by server")]
    Closed,
}

/// Errors surfaced by the HTTP API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Mapping(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("api error: {self}");
        }
        (status, Json(json!({"ok": false, "error": self.to_string()}))).into_response()
    }
}

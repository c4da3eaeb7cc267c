// --- Show-control device status ---------------------------------------------
//
// The device (Falcon Player style) exposes a JSON status document. Field types
// vary between firmware versions (numbers arrive as strings, `status` may be a
// number), so decoding goes through serde_json::Value rather than a strict
// struct.

use async_trait::async_trait;
use serde_json::Value;

use crate::{config::ShowControlConfig, error::ShowControlError};

/// The parts of the device status the poller cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub is_playing: bool,
    pub current_sequence: Option<String>,
    pub media_filename: Option<String>,
    pub seconds_played: f64,
}

impl DeviceStatus {
    pub fn from_json(v: &Value) -> Result<Self, ShowControlError> {
        let obj = v
            .as_object()
            .ok_or_else(|| ShowControlError::Decode("status is not a JSON object".into()))?;

        let status_name = text_field(v, &["status_name", "status"]);
        let is_playing = status_name
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("playing"));

        // A document with neither field is not a status response.
        if status_name.is_none() && !obj.contains_key("current_sequence") {
            return Err(ShowControlError::Decode(
                "missing status_name and current_sequence".into(),
            ));
        }

        Ok(Self {
            is_playing,
            current_sequence: text_field(v, &["current_sequence"]),
            media_filename: text_field(v, &["media_filename", "current_song"]),
            seconds_played: number_field(v, &["seconds_played", "seconds_elapsed"])
                .unwrap_or(0.0)
                .max(0.0),
        })
    }
}

fn text_field(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match v.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

fn number_field(v: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match v.get(*k) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Anything that can be asked for the current device status.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self) -> Result<DeviceStatus, ShowControlError>;
}

/// HTTP client for the device's status endpoint.
pub struct ShowControlClient {
    http: reqwest::Client,
    status_url: String,
}

impl ShowControlClient {
    pub fn new(cfg: &ShowControlConfig) -> Result<Self, ShowControlError> {
        let http = reqwest::Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self {
            http,
            status_url: cfg.status_url(),
        })
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }
}

#[async_trait]
impl StatusSource for ShowControlClient {
    async fn fetch_status(&self) -> Result<DeviceStatus, ShowControlError> {
        let resp = self.http.get(&self.status_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ShowControlError::Status(status));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| ShowControlError::Decode(e.to_string()))?;
        DeviceStatus::from_json(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_typical_playing_status() {
        let s = DeviceStatus::from_json(&json!({
            "status": "playing",
            "current_sequence": "Carol.seq",
            "media_filename": "carol.mp3",
            "seconds_played": 12.0
        }))
        .unwrap();
        assert!(s.is_playing);
        assert_eq!(s.current_sequence.as_deref(), Some("Carol.seq"));
        assert_eq!(s.media_filename.as_deref(), Some("carol.mp3"));
        assert_eq!(s.seconds_played, 12.0);
    }

    #[test]
    fn tolerates_firmware_field_variants() {
        let s = DeviceStatus::from_json(&json!({
            "status": 1,
            "status_name": "Playing",
            "current_sequence": "Bells.fseq",
            "current_song": "bells.mp3",
            "seconds_played": "37"
        }))
        .unwrap();
        assert!(s.is_playing);
        assert_eq!(s.media_filename.as_deref(), Some("bells.mp3"));
        assert_eq!(s.seconds_played, 37.0);
    }

    #[test]
    fn idle_status_with_empty_strings() {
        let s = DeviceStatus::from_json(&json!({
            "status_name": "idle",
            "current_sequence": "",
            "current_song": "",
            "seconds_played": "0"
        }))
        .unwrap();
        assert!(!s.is_playing);
        assert_eq!(s.current_sequence, None);
        assert_eq!(s.media_filename, None);
    }

    #[test]
    fn rejects_unrelated_documents() {
        assert!(DeviceStatus::from_json(&json!([1, 2, 3])).is_err());
        assert!(DeviceStatus::from_json(&json!({"hello": "world"})).is_err());
    }
}

// Process configuration.
//
// Everything comes from SHOWSYNC_* environment variables with defaults that
// match the installer layout under /opt/showsync. Values are read once at
// startup; a value that is set but unparseable aborts startup.

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use crate::error::ConfigError;

pub const DEFAULT_POLL_MS: u64 = 2000;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_HEARTBEAT_MS: u64 = 2000;
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;
pub const DEFAULT_RECONNECT_MS: u64 = 5000;
pub const DEFAULT_TICK_MS: u64 = 500;

/// Server-side settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    pub audio_dir: PathBuf,
    pub show_control: ShowControlConfig,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub keepalive_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ShowControlConfig {
    pub base_url: String,
    pub status_path: String,
    pub timeout: Duration,
}

impl ShowControlConfig {
    pub fn status_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.status_path.trim_start_matches('/')
        )
    }
}

/// Settings for the headless listener binary.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub server_url: String,
    pub reconnect_delay: Duration,
    pub tick_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind: env_parse("SHOWSYNC_BIND", "127.0.0.1:3000")?,
            db_path: env_or("SHOWSYNC_DB_PATH", "/opt/showsync/shared/showsync.db").into(),
            audio_dir: env_or("SHOWSYNC_AUDIO_DIR", "/opt/showsync/shared/audio").into(),
            show_control: ShowControlConfig {
                base_url: env_or("SHOWSYNC_FPP_URL", "http://127.0.0.1"),
                status_path: env_or("SHOWSYNC_FPP_STATUS_PATH", "/api/fppd/status"),
                timeout: env_millis("SHOWSYNC_POLL_TIMEOUT_MS", DEFAULT_POLL_TIMEOUT_MS)?,
            },
            poll_interval: env_millis("SHOWSYNC_POLL_MS", DEFAULT_POLL_MS)?,
            heartbeat_interval: env_millis("SHOWSYNC_HEARTBEAT_MS", DEFAULT_HEARTBEAT_MS)?,
            keepalive_interval: Duration::from_secs(env_parse(
                "SHOWSYNC_KEEPALIVE_SECS",
                &DEFAULT_KEEPALIVE_SECS.to_string(),
            )?),
        })
    }
}

impl ListenerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_url: env_or("SHOWSYNC_SERVER_URL", "http://127.0.0.1:3000"),
            reconnect_delay: env_millis("SHOWSYNC_RECONNECT_MS", DEFAULT_RECONNECT_MS)?,
            tick_interval: env_millis("SHOWSYNC_TICK_MS", DEFAULT_TICK_MS)?,
        })
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(var: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = env_or(var, default);
    parse_value(var, &value)
}

fn env_millis(var: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let ms: u64 = env_parse(var, &default_ms.to_string())?;
    if ms == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: ms.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(Duration::from_millis(ms))
}

fn parse_value<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

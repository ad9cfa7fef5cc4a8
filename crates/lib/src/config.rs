//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.chatline/config.json`) and environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::clock::DEFAULT_IDLE_TIMEOUT;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway connection settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Conversation/session behaviour.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Where the streaming gateway lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// WebSocket URL (default "ws://127.0.0.1:15151/ws"). Overridden by CHATLINE_GATEWAY_URL env.
    #[serde(default = "default_gateway_url")]
    pub url: String,
}

fn default_gateway_url() -> String {
    "ws://127.0.0.1:15151/ws".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Idle seconds after which the next connect rotates to a new topic (default 600).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT.as_secs()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Resolve the gateway URL: env CHATLINE_GATEWAY_URL overrides config.
pub fn resolve_gateway_url(config: &Config) -> String {
    std::env::var("CHATLINE_GATEWAY_URL")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| config.gateway.url.trim().to_string())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("CHATLINE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".chatline").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, CHATLINE_CONFIG_PATH, or the default. Missing file => defaults.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.gateway.url, "ws://127.0.0.1:15151/ws");
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"session":{"idleTimeoutSecs":30}}"#).unwrap();
        assert_eq!(config.session.idle_timeout_secs, 30);
        assert_eq!(config.gateway.url, "ws://127.0.0.1:15151/ws");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!("chatline-missing-{}.json", uuid::Uuid::new_v4()));
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.session.idle_timeout_secs, 600);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let path = std::env::temp_dir().join(format!("chatline-bad-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"{not json").unwrap();
        assert!(load_config(Some(path.clone())).is_err());
        let _ = std::fs::remove_file(path);
    }
}

//! Configuration resolution for the frontend.
//!
//! Resolution order:
//! 1. Built-in defaults
//! 2. Config file (explicit path, or `$XDG_CONFIG_HOME/hive/frontend.json`)
//! 3. Environment variables
//! 4. CLI arguments (applied by the binary, highest priority)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::Role;
use crate::error::{Error, Result};
use crate::model::Device;

/// Complete frontend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Seed for the in-memory device directory.
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Client-facing listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Outbound frames buffered per client session before it is dropped.
    pub session_queue_depth: usize,
    /// Upper bound for HTTP long-poll waits.
    pub max_wait_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            session_queue_depth: 256,
            max_wait_timeout_secs: 60,
        }
    }
}

/// Backend RPC bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Websocket endpoints of the backend shards, in shard order.
    pub endpoints: Vec<String>,
    pub request_timeout_secs: u64,
    pub subscribe_timeout_secs: u64,
    /// Replies buffered per streaming correlation before it is cut off.
    pub stream_buffer: usize,
    /// Frames buffered per shard connection awaiting the socket.
    pub outbound_buffer: usize,
    pub keepalive_secs: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["ws://127.0.0.1:9090/bus".to_string()],
            request_timeout_secs: 30,
            subscribe_timeout_secs: 30,
            stream_buffer: 128,
            outbound_buffer: 256,
            keepalive_secs: 10,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl BusConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn subscribe_timeout(&self) -> Duration {
        Duration::from_secs(self.subscribe_timeout_secs)
    }
}

/// Exponential backoff reconnection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Maximum number of reconnect attempts (None = unlimited).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (0-indexed): doubles each time, capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Whether another attempt should be made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }
}

/// Static bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub role: Role,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub device_guids: Option<Vec<String>>,
    #[serde(default)]
    pub device_guid: Option<String>,
}

/// Load configuration with hierarchical resolution.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => load_config_file(p)?,
        None => match global_config_path() {
            Some(global) if global.exists() => load_config_file(&global)?,
            _ => Config::default(),
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Get the default config file path.
pub fn global_config_path() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
        .map(|p| p.join("hive").join("frontend.json"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    debug!(path = %path.display(), "Loading config file");
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })
}

/// Apply `HIVE_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("HIVE_LISTEN_ADDR") {
        config.server.listen_addr = val;
    }
    if let Some(val) = lookup("HIVE_BUS_ENDPOINTS") {
        let endpoints: Vec<String> = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !endpoints.is_empty() {
            config.bus.endpoints = endpoints;
        }
    }
    if let Some(n) = lookup("HIVE_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.bus.request_timeout_secs = n;
    }
    if let Some(n) = lookup("HIVE_SUBSCRIBE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.bus.subscribe_timeout_secs = n;
    }
}

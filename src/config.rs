//! Configuration loading.
//!
//! Loads `./smsrelay.toml` (or `$SMSRELAY_CONFIG_PATH`). Environment variables
//! override file values; file values override defaults. A missing file is not
//! an error.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::blacklist::DEFAULT_SET_KEY;
use crate::channel::DEFAULT_TOPIC;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database settings.
    pub database: DatabaseConfig,
    /// Message channel settings.
    pub channel: ChannelConfig,
    /// Dispatch worker settings.
    pub worker: WorkerConfig,
    /// HTTP API settings.
    pub api: ApiConfig,
    /// Input limits.
    pub limits: LimitsConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let mut config = Self::load_from_file(&Self::config_path_with(env))?;
        config.apply_overrides(env);
        Ok(config)
    }

    /// Parse a TOML string into config (no env overrides).
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or mistyped values.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    fn load_from_file(path: &PathBuf) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("invalid config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config file {}: {e}",
                path.display()
            )),
        }
    }

    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("SMSRELAY_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("smsrelay.toml"))
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests avoid mutating the process environment.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("SMSRELAY_DB_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = env("SMSRELAY_TOPIC") {
            self.channel.topic = v;
        }
        if let Some(n) = parse_override(&env, "SMSRELAY_MESSAGE_DEADLINE_SECS") {
            self.worker.message_deadline_secs = n;
        }
        if let Some(v) = env("SMSRELAY_API_BIND") {
            self.api.bind = v;
        }
        if let Some(n) = parse_override(&env, "SMSRELAY_API_PORT") {
            self.api.port = n;
        }
        if let Some(v) = env("SMSRELAY_API_TOKEN") {
            self.api.auth_token = Some(v).filter(|t| !t.is_empty());
        }
        if let Some(v) = env("SMSRELAY_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env("SMSRELAY_LOG_DIR") {
            self.logging.dir = Some(PathBuf::from(v));
        }
    }
}

fn parse_override<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Option<T> {
    let value = env(key)?;
    match value.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(var = key, value = %value, "ignoring invalid env override");
            None
        }
    }
}

/// Resolve the default data directory (`~/.smsrelay/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn data_dir() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".smsrelay"))
}

// ── Sections ────────────────────────────────────────────────────

/// SQLite database settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path.
    pub path: PathBuf,
    /// Maximum pooled connections.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let root = data_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            path: root.join("smsrelay.db"),
            max_connections: 5,
        }
    }
}

/// Message channel settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Topic carrying dispatch envelopes.
    pub topic: String,
    /// Idle re-check interval for messages published by other processes.
    pub poll_interval_ms: u64,
    /// Key of the blacklisted-numbers set.
    pub blacklist_set_key: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_owned(),
            poll_interval_ms: 500,
            blacklist_set_key: DEFAULT_SET_KEY.to_owned(),
        }
    }
}

impl ChannelConfig {
    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Dispatch worker settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Deadline for the per-message chain (read, check, send, update).
    pub message_deadline_secs: u64,
    /// How long shutdown waits for the in-flight message.
    pub shutdown_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            message_deadline_secs: 5,
            shutdown_timeout_secs: 10,
        }
    }
}

impl WorkerConfig {
    /// Per-message deadline as a [`Duration`].
    pub fn message_deadline(&self) -> Duration {
        Duration::from_secs(self.message_deadline_secs.max(1))
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// HTTP API settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Listen address.
    pub bind: String,
    /// Listen port.
    pub port: u16,
    /// Bearer token required on `/v1` routes; `None` disables the check.
    pub auth_token: Option<String>,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "__REDACTED__"),
            )
            .finish()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_owned(),
            port: 3333,
            auth_token: None,
        }
    }
}

/// Input limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum message length in characters.
    pub max_message_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 1600,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for JSON log files; console-only when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            dir: None,
        }
    }
}

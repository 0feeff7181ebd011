// Configuration File Support
//
// TOML configuration for the quota engine with environment variable
// overrides. The file is taken from --config, then QUOTAGUARD_CONFIG, then
// ./quotaguard.toml. A missing file yields the defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::engine::{EngineConfig, SweepConfig};
use crate::logging::LoggingConfig;
use crate::quota::QuotaConfig;

/// Config file used when neither --config nor QUOTAGUARD_CONFIG is set
pub const DEFAULT_CONFIG_FILE: &str = "quotaguard.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Limits and windows
    pub quota: QuotaConfig,

    /// Transaction timing and conflict retries
    pub engine: EngineConfig,

    /// State persistence
    pub storage: StorageConfig,

    /// HTTP API
    pub server: ServerConfig,

    /// Tier-expiry sweeper
    pub sweep: SweepConfig,
}

/// State persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON snapshot backing the file store; the ledger sits beside it
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("./quotaguard-state.json"),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub bind_address: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.bind_address, self.port))
    }
}

impl Config {
    /// Load configuration from the resolved config path
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_from_path(Self::config_path(explicit))
    }

    /// Which file to read: `explicit`, then `QUOTAGUARD_CONFIG`, then the default
    pub fn config_path(explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("QUOTAGUARD_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load configuration from a specific path
    ///
    /// Returns an error if the file exists but cannot be parsed or fails
    /// validation. A missing file yields defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::debug!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `QUOTAGUARD_*` environment overrides
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; unparsable values are ignored
    ///
    /// - QUOTAGUARD_LOG_LEVEL, QUOTAGUARD_LOG_FORMAT
    /// - QUOTAGUARD_DAILY_LIMIT, QUOTAGUARD_FREE_MONTHLY_LIMIT,
    ///   QUOTAGUARD_PREMIUM_MONTHLY_LIMIT, QUOTAGUARD_DEDUP_WINDOW_SECS,
    ///   QUOTAGUARD_UTC_OFFSET_MINUTES
    /// - QUOTAGUARD_COMMIT_TIMEOUT_MS, QUOTAGUARD_CONFLICT_RETRIES
    /// - QUOTAGUARD_STATE_PATH
    /// - QUOTAGUARD_BIND_ADDRESS, QUOTAGUARD_PORT
    /// - QUOTAGUARD_SWEEP_ENABLED, QUOTAGUARD_SWEEP_INTERVAL_SECS
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        // Logging overrides
        if let Some(level) = parsed(&lookup, "QUOTAGUARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = parsed(&lookup, "QUOTAGUARD_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Quota overrides
        if let Some(limit) = parsed(&lookup, "QUOTAGUARD_DAILY_LIMIT") {
            self.quota.daily_limit = limit;
        }
        if let Some(limit) = parsed(&lookup, "QUOTAGUARD_FREE_MONTHLY_LIMIT") {
            self.quota.free_monthly_limit = limit;
        }
        if let Some(limit) = parsed(&lookup, "QUOTAGUARD_PREMIUM_MONTHLY_LIMIT") {
            self.quota.premium_monthly_limit = limit;
        }
        if let Some(secs) = parsed(&lookup, "QUOTAGUARD_DEDUP_WINDOW_SECS") {
            self.quota.dedup_window_secs = secs;
        }
        if let Some(minutes) = parsed(&lookup, "QUOTAGUARD_UTC_OFFSET_MINUTES") {
            self.quota.utc_offset_minutes = minutes;
        }

        // Engine overrides
        if let Some(ms) = parsed(&lookup, "QUOTAGUARD_COMMIT_TIMEOUT_MS") {
            self.engine.commit_timeout_ms = ms;
        }
        if let Some(retries) = parsed(&lookup, "QUOTAGUARD_CONFLICT_RETRIES") {
            self.engine.conflict_retries = retries;
        }

        // Storage and server overrides
        if let Some(path) = lookup("QUOTAGUARD_STATE_PATH").filter(|p| !p.is_empty()) {
            self.storage.state_path = PathBuf::from(path);
        }
        if let Some(address) = lookup("QUOTAGUARD_BIND_ADDRESS").filter(|a| !a.is_empty()) {
            self.server.bind_address = address;
        }
        if let Some(port) = parsed(&lookup, "QUOTAGUARD_PORT") {
            self.server.port = port;
        }

        // Sweep overrides
        if let Some(enabled) = parsed(&lookup, "QUOTAGUARD_SWEEP_ENABLED") {
            self.sweep.enabled = enabled;
        }
        if let Some(secs) = parsed(&lookup, "QUOTAGUARD_SWEEP_INTERVAL_SECS") {
            self.sweep.interval_secs = secs;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.quota.validate().context("Invalid [quota] section")?;
        self.engine.validate().context("Invalid [engine] section")?;
        self.sweep.validate().context("Invalid [sweep] section")?;

        if self.storage.state_path.as_os_str().is_empty() {
            anyhow::bail!("storage.state_path must not be empty");
        }
        if self.server.bind_address.is_empty() {
            anyhow::bail!("server.bind_address must not be empty");
        }
        Ok(())
    }
}

//! Application configuration module
//!
//! Configuration is layered: built-in defaults, then an optional TOML file
//! named by `OFFLINE_RELAY_CONFIG`, then individual environment variables.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default remote service URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Environment variable naming an optional TOML config file
pub const CONFIG_FILE_ENV: &str = "OFFLINE_RELAY_CONFIG";
/// Environment variable overriding the remote service URL
pub const SERVER_URL_ENV: &str = "CLIENT_API_URL";
/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "OFFLINE_RELAY_DATA_DIR";
/// Environment variable overriding the attempt ceiling
pub const MAX_ATTEMPTS_ENV: &str = "OFFLINE_RELAY_MAX_ATTEMPTS";
/// Environment variable overriding the probe interval in seconds
pub const PROBE_SECS_ENV: &str = "OFFLINE_RELAY_PROBE_SECS";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_HANDOFF_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_WORKER_MAX_RESTARTS: u32 = 5;

/// Paths that are never served from or written to the response cache
pub const DEFAULT_EXCLUDED_PATHS: &[&str] = &[
    "/api/auth/login",
    "/api/auth/register",
    "/api/push/send",
    "/api/push/subscribe",
];

/// Assets pre-cached when the background worker starts
pub const DEFAULT_SHELL_ASSETS: &[&str] = &["/", "/index.html", "/manifest.json"];

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Remote service base URL
    pub server_url: String,
    /// Directory holding the SQLite database and fallback blobs
    pub data_dir: PathBuf,
    /// Failed replays before an operation is marked failed
    pub max_attempts: u32,
    /// Timeout applied to the health probe
    pub health_timeout: Duration,
    /// Interval between connectivity probes
    pub probe_interval: Duration,
    /// How long a hand-off to the worker may hold the posts drain guard
    pub handoff_timeout: Duration,
    /// How many times the supervisor restarts a panicked worker
    pub worker_max_restarts: u32,
    /// Application-shell assets pre-cached by the worker
    pub shell_assets: Vec<String>,
    /// Path prefixes that bypass the response cache
    pub excluded_paths: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            data_dir: default_data_dir(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            handoff_timeout: DEFAULT_HANDOFF_TIMEOUT,
            worker_max_restarts: DEFAULT_WORKER_MAX_RESTARTS,
            shell_assets: DEFAULT_SHELL_ASSETS.iter().map(|s| s.to_string()).collect(),
            excluded_paths: DEFAULT_EXCLUDED_PATHS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Load defaults, then the TOML file named by `OFFLINE_RELAY_CONFIG`, then env overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = AppConfig::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.toml_file(Path::new(&path))?;
        }
        builder.env_overrides()?.build()
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        AppConfig::builder().toml_str(source)?.build()
    }

    /// Path of the SQLite queue database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("queue.db")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.server_url.clone()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if self.health_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "health_timeout",
                message: "must be non-zero".to_string(),
            });
        }
        if self.probe_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "probe_interval",
                message: "must be non-zero".to_string(),
            });
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingValue("data_dir"));
        }
        Ok(())
    }
}

/// Platform data directory, e.g. `~/.local/share/offline-relay`
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("offline-relay"))
        .unwrap_or_else(|| PathBuf::from(".offline-relay"))
}

/// On-disk TOML shape; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    server_url: Option<String>,
    data_dir: Option<PathBuf>,
    max_attempts: Option<u32>,
    health_timeout_secs: Option<u64>,
    probe_interval_secs: Option<u64>,
    handoff_timeout_secs: Option<u64>,
    worker_max_restarts: Option<u32>,
    shell_assets: Option<Vec<String>>,
    excluded_paths: Option<Vec<String>>,
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    server_url: Option<String>,
    data_dir: Option<PathBuf>,
    max_attempts: Option<u32>,
    health_timeout: Option<Duration>,
    probe_interval: Option<Duration>,
    handoff_timeout: Option<Duration>,
    worker_max_restarts: Option<u32>,
    shell_assets: Option<Vec<String>>,
    excluded_paths: Option<Vec<String>>,
}

impl AppConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Set the data directory
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set the attempt ceiling
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Set the health probe timeout
    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = Some(timeout);
        self
    }

    /// Set the probe interval
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = Some(interval);
        self
    }

    /// Set the hand-off timeout
    pub fn handoff_timeout(mut self, timeout: Duration) -> Self {
        self.handoff_timeout = Some(timeout);
        self
    }

    /// Set the worker restart limit
    pub fn worker_max_restarts(mut self, restarts: u32) -> Self {
        self.worker_max_restarts = Some(restarts);
        self
    }

    /// Set the application-shell assets
    pub fn shell_assets(mut self, assets: Vec<String>) -> Self {
        self.shell_assets = Some(assets);
        self
    }

    /// Set the cache exclusion list
    pub fn excluded_paths(mut self, paths: Vec<String>) -> Self {
        self.excluded_paths = Some(paths);
        self
    }

    /// Apply keys from a TOML document
    pub fn toml_str(mut self, source: &str) -> Result<Self, ConfigError> {
        let file: FileConfig =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;

        if let Some(url) = file.server_url {
            self.server_url = Some(url);
        }
        if let Some(dir) = file.data_dir {
            self.data_dir = Some(dir);
        }
        if let Some(max) = file.max_attempts {
            self.max_attempts = Some(max);
        }
        if let Some(secs) = file.health_timeout_secs {
            self.health_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = file.probe_interval_secs {
            self.probe_interval = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = file.handoff_timeout_secs {
            self.handoff_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(restarts) = file.worker_max_restarts {
            self.worker_max_restarts = Some(restarts);
        }
        if let Some(assets) = file.shell_assets {
            self.shell_assets = Some(assets);
        }
        if let Some(paths) = file.excluded_paths {
            self.excluded_paths = Some(paths);
        }
        Ok(self)
    }

    /// Apply keys from a TOML file on disk
    pub fn toml_file(self, path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        self.toml_str(&source)
    }

    /// Apply `CLIENT_API_URL`, `OFFLINE_RELAY_DATA_DIR`, `OFFLINE_RELAY_MAX_ATTEMPTS`
    /// and `OFFLINE_RELAY_PROBE_SECS` when set
    pub fn env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            self.server_url = Some(url);
        }
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(raw) = std::env::var(MAX_ATTEMPTS_ENV) {
            let max = raw.parse::<u32>().map_err(|_| ConfigError::InvalidValue {
                field: "max_attempts",
                message: format!("not a number: {}", raw),
            })?;
            self.max_attempts = Some(max);
        }
        if let Ok(raw) = std::env::var(PROBE_SECS_ENV) {
            let secs = raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                field: "probe_interval",
                message: format!("not a number: {}", raw),
            })?;
            self.probe_interval = Some(Duration::from_secs(secs));
        }
        Ok(self)
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            server_url: self.server_url.unwrap_or(defaults.server_url),
            data_dir: self.data_dir.unwrap_or(defaults.data_dir),
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            health_timeout: self.health_timeout.unwrap_or(defaults.health_timeout),
            probe_interval: self.probe_interval.unwrap_or(defaults.probe_interval),
            handoff_timeout: self.handoff_timeout.unwrap_or(defaults.handoff_timeout),
            worker_max_restarts: self
                .worker_max_restarts
                .unwrap_or(defaults.worker_max_restarts),
            shell_assets: self.shell_assets.unwrap_or(defaults.shell_assets),
            excluded_paths: self.excluded_paths.unwrap_or(defaults.excluded_paths),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("failed to read config: {0}")]
    Io(String),
}

impl From<ConfigError> for crate::shared::error::SyncError {
    fn from(err: ConfigError) -> Self {
        Self::config(err.to_string())
    }
}

//! Runtime configuration for clf-serve.
//!
//! Configuration is loaded from a JSON file (falling back to defaults) and
//! overlaid with command-line flags. API credentials come from the process
//! environment and are read exactly once at startup.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable holding the Basic-auth username.
pub const USERNAME_ENV: &str = "AUTH_UN";

/// Environment variable holding the Basic-auth password.
pub const PASSWORD_ENV: &str = "AUTH_PW";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("Environment variable {0} is empty")]
    EmptyEnv(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "clf-serve", about = "Authenticated classifier inference server")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address. Overrides `server.listen` from the config file.
    #[arg(long, env = "SERVER_ADDR")]
    pub listen: Option<String>,

    /// Listen host. Replaces the host part of the listen address.
    #[arg(long, env = "SERVER_IP", conflicts_with = "listen")]
    pub host: Option<String>,

    /// Listen port. Replaces the port part of the listen address.
    #[arg(long, env = "SERVER_PORT", conflicts_with = "listen")]
    pub port: Option<u16>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Model artifact location.
    pub model: ModelConfig,

    /// Monitoring capture settings.
    pub monitoring: MonitoringConfig,

    /// Log output settings.
    pub logging: LoggingConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "127.0.0.1:8000").
    pub listen: String,

    /// Largest accepted `/inference` body. Checked after authentication.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8000".to_string(),
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Model-related settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the versioned JSON model artifact.
    pub artifact_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from("models/model.json"),
        }
    }
}

/// Monitoring sink and dispatch queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Directory receiving one CSV file per process start.
    pub storage_dir: PathBuf,

    /// Buffered row count that forces a flush to disk.
    pub flush_threshold: usize,

    /// Capacity of the dispatch queue, in record groups.
    pub queue_capacity: usize,

    /// Also fsync the file on every threshold flush (close always fsyncs).
    pub sync_on_flush: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("data/monitoring"),
            flush_threshold: 5,
            queue_capacity: 1024,
            sync_on_flush: false,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory receiving one `app_<timestamp>.log` per process start.
    /// `null` disables the log file.
    pub dir: Option<PathBuf>,

    /// Also write logs to stdout.
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: Some(PathBuf::from("data/logs")),
            console: true,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        // Logging is not initialized yet; the caller reports a missing file.
        let config = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            serde_json::from_str(&data)?
        } else {
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
            return;
        }
        if cli.host.is_none() && cli.port.is_none() {
            return;
        }

        let (host, port) = match self.server.listen.rsplit_once(':') {
            Some((host, port)) => (host.to_string(), port.to_string()),
            None => (self.server.listen.clone(), String::new()),
        };
        let host = cli.host.clone().unwrap_or(host);
        let port = cli.port.map(|p| p.to_string()).unwrap_or(port);
        self.server.listen = format!("{host}:{port}");
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitoring.flush_threshold == 0 {
            return Err(ConfigError::Invalid(
                "monitoring.flush_threshold must be at least 1".to_string(),
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_body_bytes must be at least 1".to_string(),
            ));
        }
        if self.monitoring.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "monitoring.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// The single static credential pair accepted by the API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read the credential pair from `AUTH_UN` / `AUTH_PW`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(read_env(USERNAME_ENV)?, read_env(PASSWORD_ENV)?))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn read_env(key: &'static str) -> Result<String, ConfigError> {
    let value = std::env::var(key).map_err(|_| ConfigError::MissingEnv(key))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyEnv(key));
    }
    Ok(value)
}

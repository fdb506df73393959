use crate::transport::{ClientConfig, ReconnectPolicy, collector_url};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HOST: &str = "socket.apianalytics.com:80";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Environment error: {0}")]
    EnvError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ConfigError::EnvError(format!("Invalid LOG_LEVEL: {s}"))),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Agent options. Every source (CLI, environment, TOML) fills the same named
/// fields; anything it does not mention keeps its default.
///
/// The service token is deliberately not part of this struct.
#[derive(Parser, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct AgentConfig {
    /// Collector address as host:port
    #[arg(long, env = "APIANALYTICS_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Include response body text in records
    #[arg(long, env = "APIANALYTICS_SEND_BODY")]
    pub send_body: bool,

    /// Number of records per batch
    #[arg(long, env = "APIANALYTICS_BATCH", default_value = "1")]
    pub batch: usize,

    /// Maximum records waiting in the queue (0 = unbounded)
    #[arg(long, env = "APIANALYTICS_MAX_QUEUED", default_value = "10000")]
    pub max_queued: usize,

    /// First reconnection delay in milliseconds
    #[arg(long, env = "APIANALYTICS_RECONNECT_BASE_DELAY_MS", default_value = "500")]
    pub reconnect_base_delay_ms: u64,

    /// Upper bound for reconnection delays in milliseconds
    #[arg(long, env = "APIANALYTICS_RECONNECT_MAX_DELAY_MS", default_value = "30000")]
    pub reconnect_max_delay_ms: u64,

    /// Timeout for a single connection attempt in milliseconds
    #[arg(long, env = "APIANALYTICS_CONNECT_TIMEOUT_MS", default_value = "10000")]
    pub connect_timeout_ms: u64,

    /// Server address reported in records (auto-detected if not provided)
    #[arg(long, env = "APIANALYTICS_SERVER_ADDRESS")]
    pub server_address: Option<String>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[arg(long, env = "APIANALYTICS_LOG_JSON")]
    pub log_json: bool,

    /// Derived fields (not CLI arguments)
    #[serde(skip)]
    #[arg(skip)]
    pub reconnect: ReconnectPolicy,

    #[serde(skip)]
    #[arg(skip)]
    pub connect_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            send_body: false,
            batch: 1,
            max_queued: 10_000,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            connect_timeout_ms: 10_000,
            server_address: None,
            log_level: LogLevel::Info,
            log_json: false,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl AgentConfig {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = AgentConfig::try_parse_from(args)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = AgentConfig::default();

        load_env_string("APIANALYTICS_HOST", &mut config.host);
        load_env_var("APIANALYTICS_SEND_BODY", &mut config.send_body)?;
        load_env_var("APIANALYTICS_BATCH", &mut config.batch)?;
        load_env_var("APIANALYTICS_MAX_QUEUED", &mut config.max_queued)?;
        load_env_var(
            "APIANALYTICS_RECONNECT_BASE_DELAY_MS",
            &mut config.reconnect_base_delay_ms,
        )?;
        load_env_var(
            "APIANALYTICS_RECONNECT_MAX_DELAY_MS",
            &mut config.reconnect_max_delay_ms,
        )?;
        load_env_var("APIANALYTICS_CONNECT_TIMEOUT_MS", &mut config.connect_timeout_ms)?;
        load_env_string_opt("APIANALYTICS_SERVER_ADDRESS", &mut config.server_address);
        load_env_var("APIANALYTICS_LOG_JSON", &mut config.log_json)?;

        if let Ok(log_level) = std::env::var("LOG_LEVEL") {
            config.log_level = log_level.parse()?;
        }

        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file. Unknown keys are ignored.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: AgentConfig = toml::from_str(content)?;
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn post_process(&mut self) -> Result<(), ConfigError> {
        self.host = self.host.trim().to_string();
        self.reconnect = ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
            jitter: true,
        };
        self.connect_timeout = Duration::from_millis(self.connect_timeout_ms);

        if let Some(address) = &self.server_address
            && address.trim().is_empty()
        {
            self.server_address = None;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        collector_url(&self.host).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;

        if self.batch == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.reconnect_base_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Reconnect base delay must be greater than 0".to_string(),
            ));
        }

        if self.reconnect_base_delay_ms > self.reconnect_max_delay_ms {
            return Err(ConfigError::InvalidConfig(format!(
                "Reconnect base delay ({}ms) must not exceed max delay ({}ms)",
                self.reconnect_base_delay_ms, self.reconnect_max_delay_ms
            )));
        }

        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Connection timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            address: self.host.clone(),
            reconnect: self.reconnect,
            connect_timeout: self.connect_timeout,
        }
    }
}

/// Helper function to load and parse an environment variable.
/// Returns Ok(()) if the variable doesn't exist (keeps default).
fn load_env_var<T>(name: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(value) = std::env::var(name) {
        *target = value
            .parse()
            .map_err(|e| ConfigError::EnvError(format!("Invalid {name}: {e}")))?;
    }
    Ok(())
}

fn load_env_string(name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(name) {
        *target = value;
    }
}

fn load_env_string_opt(name: &str, target: &mut Option<String>) {
    if let Ok(value) = std::env::var(name) {
        *target = Some(value);
    }
}

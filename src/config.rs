use rdt_protocol::RDT_PORT;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_TARE_SAMPLES: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("Environment file error: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

/// Connection and timing settings for one Net F/T box
#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfig {
    /// Host name or IP address of the box
    pub ip: String,
    pub port: u16,
    /// Pause between halting the handler and sending STOP, so samples already
    /// in flight drain instead of leaking into the next session
    pub settle_delay: Duration,
    /// How often the streaming handler checks whether it should stop
    pub poll_interval: Duration,
    /// Default sample count for `tare`
    pub tare_samples: usize,
}

impl SensorConfig {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port: RDT_PORT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            tare_samples: DEFAULT_TARE_SAMPLES,
        }
    }

    /// Load configuration from `NETFT_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists (for development)
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from a dotenv-style file without touching the process environment
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        for item in dotenvy::from_path_iter(path)? {
            let (key, value) = item?;
            values.insert(key, value);
        }
        Self::from_lookup(|key| values.get(key).cloned())
    }

    /// Build a configuration from any key lookup; only `NETFT_IP` is required
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ip = lookup("NETFT_IP")
            .filter(|ip| !ip.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("NETFT_IP".to_string()))?;

        let mut config = Self::new(ip.trim());

        if let Some(port) = parse_var(&lookup, "NETFT_PORT")? {
            config.port = port;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "NETFT_SETTLE_MS")? {
            config.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "NETFT_POLL_MS")? {
            if ms == 0 {
                return Err(invalid("NETFT_POLL_MS", "poll interval must be positive"));
            }
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(samples) = parse_var::<usize, _>(&lookup, "NETFT_TARE_SAMPLES")? {
            if samples == 0 {
                return Err(invalid("NETFT_TARE_SAMPLES", "at least one sample is required"));
            }
            config.tare_samples = samples;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(key, &e.to_string())),
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Load configuration with helpful error messages
pub fn load_config() -> Result<SensorConfig, ConfigError> {
    match SensorConfig::from_env() {
        Ok(config) => {
            log::info!(
                "Loaded sensor configuration for {}:{}",
                config.ip,
                config.port
            );
            Ok(config)
        }
        Err(ConfigError::MissingEnvVar(var)) => {
            log::error!("Missing required environment variable: {}", var);
            log::error!("Pass --ip or create a .env file in the project root with:");
            log::error!("{}=192.168.1.1", var);
            Err(ConfigError::MissingEnvVar(var))
        }
        Err(e) => {
            log::error!("Configuration error: {}", e);
            Err(e)
        }
    }
}

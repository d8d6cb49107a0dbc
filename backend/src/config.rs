use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::detector::config::DetectorSettings;

const DEFAULT_PORT: &str = "8081";
const DEFAULT_BIND_HOST: &str = "0.0.0.0";
const DEFAULT_SCRATCH_DIR: &str = "image_set";
const DEFAULT_WAIT_SECS: u64 = 10;
const DEFAULT_RETENTION_SECS: u64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub source_bucket: String,
    pub predictions_bucket: String,
    pub instances_table: Option<String>,
    pub scratch_dir: PathBuf,
    pub wait_timeout: Duration,
    /// How long finished records stay in the in-process instance store.
    pub instance_retention: Duration,
    pub detector: DetectorSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = get("PORT").unwrap_or_else(|| DEFAULT_PORT.to_string());
        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("PORT is not a valid port: {}", port)))?;
        let host = get("BIND_HOST").unwrap_or_else(|| DEFAULT_BIND_HOST.to_string());

        let source_bucket = get("SOURCE_BUCKET_NAME").ok_or(ConfigError::Missing("SOURCE_BUCKET_NAME"))?;
        let predictions_bucket =
            get("PREDICTIONS_BUCKET_NAME").ok_or(ConfigError::Missing("PREDICTIONS_BUCKET_NAME"))?;

        let seconds = |key: &str, default: u64| match get(key) {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid(format!("{} is not a number: {}", key, raw))),
            None => Ok(default),
        };
        let wait_secs = seconds("ORCHESTRATION_WAIT_SECS", DEFAULT_WAIT_SECS)?;
        let retention_secs = seconds("INSTANCE_RETENTION_SECS", DEFAULT_RETENTION_SECS)?;

        let detector = match get("DETECTOR_CONFIG") {
            Some(path) => DetectorSettings::load(&PathBuf::from(path))?,
            None => DetectorSettings::default(),
        };

        Ok(Self {
            bind_address: format!("{}:{}", host, port),
            source_bucket,
            predictions_bucket,
            instances_table: get("INSTANCES_TABLE"),
            scratch_dir: PathBuf::from(get("SCRATCH_DIR").unwrap_or_else(|| DEFAULT_SCRATCH_DIR.to_string())),
            wait_timeout: Duration::from_secs(wait_secs),
            instance_retention: Duration::from_secs(retention_secs),
            detector,
        })
    }
}

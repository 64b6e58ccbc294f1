//! Service configuration
//!
//! Loaded from a TOML file with env overrides for deployment knobs; all
//! job parameters are validated here before the server starts.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub detector: DetectorConfig,
    pub jobs: JobsConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind: String,

    /// Upload size cap in bytes
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Base URL of the external inference service
    pub base_url: String,

    /// Confidence threshold used when a request does not pass one
    pub default_conf: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Target frame rate used when a request does not pass one
    pub default_fps: f32,

    /// Highest accepted target frame rate
    pub max_fps: f32,

    /// Concurrent job cap
    pub max_jobs: usize,

    /// Seconds a finished job stays queryable
    pub retention_seconds: u64,

    /// Eviction sweep interval
    pub eviction_interval_seconds: u64,

    /// Record annotated output MP4s for uploaded videos
    pub record_outputs: bool,

    /// Where recorded outputs go
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// History JSON file
    pub path: PathBuf,

    /// Maximum retained entries
    pub limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            max_upload_bytes: 200 * 1024 * 1024,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9090".to_string(),
            default_conf: 0.25,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_fps: 5.0,
            max_fps: 30.0,
            max_jobs: 32,
            retention_seconds: 300,
            eviction_interval_seconds: 30,
            record_outputs: true,
            output_dir: PathBuf::from("data/outputs"),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/history.json"),
            limit: 500,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            detector: DetectorConfig::default(),
            jobs: JobsConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl Config {
    /// Load from a TOML file, or defaults when `path` is `None`
    ///
    /// `HEADCOUNT_BIND` and `HEADCOUNT_DETECTOR_URL` override the file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            }
            None => Self::default(),
        };

        if let Ok(bind) = std::env::var("HEADCOUNT_BIND") {
            config.server.bind = bind;
        }
        if let Ok(url) = std::env::var("HEADCOUNT_DETECTOR_URL") {
            config.detector.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values before anything starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs.default_fps <= 0.0 || self.jobs.default_fps > self.jobs.max_fps {
            return Err(ConfigError::Invalid(format!(
                "default_fps must be in (0, {}], got {}",
                self.jobs.max_fps, self.jobs.default_fps
            )));
        }
        if !(0.0..=1.0).contains(&self.detector.default_conf) {
            return Err(ConfigError::Invalid(format!(
                "default_conf must be in [0, 1], got {}",
                self.detector.default_conf
            )));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_upload_bytes must be positive".to_string(),
            ));
        }
        if self.jobs.max_jobs == 0 {
            return Err(ConfigError::Invalid(
                "max_jobs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.jobs.default_fps, 5.0);
        assert_eq!(config.history.limit, 500);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            bind = "0.0.0.0:9000"

            [jobs]
            max_jobs = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.jobs.max_jobs, 4);
        // Untouched sections keep their defaults
        assert_eq!(config.jobs.default_fps, 5.0);
        assert_eq!(config.detector.default_conf, 0.25);
    }

    #[test]
    fn test_rejects_bad_fps() {
        let mut config = Config::default();
        config.jobs.default_fps = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.jobs.default_fps = 99.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_bad_conf() {
        let mut config = Config::default();
        config.detector.default_conf = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}

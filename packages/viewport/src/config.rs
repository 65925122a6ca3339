//! Application configuration.
//!
//! The defaults live in `config/default.toml` and are embedded at compile
//! time. [`AppConfig::load`] reads the file named by `VENUE_MAP_CONFIG`
//! instead when that variable is set, then applies the `VENUE_MAP_API_URL`
//! override.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use venue_map_api::ApiConfig;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "VENUE_MAP_CONFIG";

/// Environment variable overriding `api.base_url`.
pub const API_URL_ENV: &str = "VENUE_MAP_API_URL";

const DEFAULT_TOML: &str = include_str!("../config/default.toml");

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has the wrong shape.
    #[error("Invalid config in {origin}: {source}")]
    Toml {
        /// Where the TOML came from.
        origin: String,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration, passed explicitly to every component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// REST client settings.
    #[serde(default)]
    pub api: ApiConfig,
    /// Synchronizer timings and default box size.
    #[serde(default)]
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Loads configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the selected file cannot be read or
    /// parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::embedded()?,
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                log::debug!("Using API base URL from {API_URL_ENV}: {url}");
                config.api.base_url = url.to_string();
            }
        }

        Ok(config)
    }

    /// The embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the embedded file is malformed.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml_str(DEFAULT_TOML, "embedded default.toml")
    }

    /// Reads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Parses configuration from TOML text. Missing sections and keys fall
    /// back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the text is malformed.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::de::from_str(text).map_err(|source| ConfigError::Toml {
            origin: origin.to_string(),
            source,
        })
    }
}

/// Synchronizer timings and the default deep-link box size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Wait before animating a non-immediate request.
    pub pre_animate_delay_ms: u64,
    /// Wait between camera-not-ready retries.
    pub camera_retry_delay_ms: u64,
    /// Animate (and read-back) attempts before a request is abandoned.
    pub camera_max_attempts: u32,
    /// Settle wait after a first-try animate.
    pub settle_delay_ms: u64,
    /// Settle wait after an animate that needed retries.
    pub settle_after_retry_delay_ms: u64,
    /// Upper bound on waiting for a surface settle signal.
    pub settle_timeout_ms: u64,
    /// Latitude span, in degrees, of boxes built around a single point.
    pub default_lat_span: f64,
    /// Longitude span, in degrees, of boxes built around a single point.
    pub default_lon_span: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pre_animate_delay_ms: 500,
            camera_retry_delay_ms: 500,
            camera_max_attempts: 20,
            settle_delay_ms: 50,
            settle_after_retry_delay_ms: 500,
            settle_timeout_ms: 2000,
            default_lat_span: 0.1,
            default_lon_span: 0.1,
        }
    }
}

impl SyncConfig {
    /// [`Self::pre_animate_delay_ms`] as a [`Duration`].
    #[must_use]
    pub const fn pre_animate_delay(&self) -> Duration {
        Duration::from_millis(self.pre_animate_delay_ms)
    }

    /// [`Self::camera_retry_delay_ms`] as a [`Duration`].
    #[must_use]
    pub const fn camera_retry_delay(&self) -> Duration {
        Duration::from_millis(self.camera_retry_delay_ms)
    }

    /// Settle wait, longer when the camera needed retries to mount.
    #[must_use]
    pub const fn settle_delay(&self, after_retry: bool) -> Duration {
        if after_retry {
            Duration::from_millis(self.settle_after_retry_delay_ms)
        } else {
            Duration::from_millis(self.settle_delay_ms)
        }
    }

    /// [`Self::settle_timeout_ms`] as a [`Duration`].
    #[must_use]
    pub const fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    /// Attempts, never less than one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.camera_max_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_matches_defaults() {
        let config = AppConfig::embedded().unwrap();
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.api, ApiConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AppConfig::from_toml_str(
            "[api]\nbase_url = \"http://localhost:3000/api/v1\"\n\n[sync]\nsettle_delay_ms = 120\n",
            "test",
        )
        .unwrap();
        assert_eq!(config.api.base_url, "http://localhost:3000/api/v1");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.sync.settle_delay_ms, 120);
        assert_eq!(config.sync.camera_max_attempts, 20);
    }

    #[test]
    fn malformed_toml_reports_origin() {
        let err = AppConfig::from_toml_str("[sync\n", "broken.toml").unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = AppConfig::from_file(Path::new("/nonexistent/venue_map.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn settle_delay_depends_on_retry() {
        let sync = SyncConfig::default();
        assert_eq!(sync.settle_delay(false), Duration::from_millis(50));
        assert_eq!(sync.settle_delay(true), Duration::from_millis(500));
    }
}

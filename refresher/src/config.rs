//! Refresher configuration.

use std::path::PathBuf;
use std::time::Duration;

use refrate_common::{constants, DurationExt};
use refrate_fx::ConverterConfig;

/// Main refresher configuration.
#[derive(Debug, Clone)]
pub struct RefresherConfig {
    /// Feed and fetch settings.
    pub converter: ConverterConfig,
    /// Directory holding the feed cache.
    pub cache_dir: PathBuf,
    /// Maximum age of the rates before a new fetch.
    pub refresh_interval: Duration,
    /// Time between checks; failed fetches are retried at this pace.
    pub retry_interval: Duration,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            converter: ConverterConfig::default(),
            cache_dir: PathBuf::from("/var/cache/refrate"),
            refresh_interval: constants::refresh_interval().as_std(),
            retry_interval: constants::retry_interval().as_std(),
            log_level: "info".to_string(),
        }
    }
}

impl RefresherConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self {
            converter: ConverterConfig::from_env(),
            ..Self::default()
        };

        if let Ok(dir) = std::env::var("REFRATE_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }

        if let Ok(secs) = std::env::var("REFRATE_REFRESH_SECS") {
            if let Ok(secs) = secs.parse() {
                config.refresh_interval = Duration::from_secs(secs);
            }
        }

        if let Ok(secs) = std::env::var("REFRATE_RETRY_SECS") {
            if let Ok(secs) = secs.parse() {
                config.retry_interval = Duration::from_secs(secs);
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.converter.validate()?;

        if self.cache_dir.as_os_str().is_empty() {
            return Err("Cache directory cannot be empty".to_string());
        }

        let minimum = constants::min_refresh_interval().as_std();
        if self.retry_interval < minimum {
            return Err(format!(
                "Retry interval {:?} is shorter than the minimum {:?}",
                self.retry_interval, minimum
            ));
        }

        if self.retry_interval > self.refresh_interval {
            return Err("Retry interval cannot exceed refresh interval".to_string());
        }

        Ok(())
    }
}

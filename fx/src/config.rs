//! Converter configuration.

use std::time::Duration;

use refrate_common::{constants, DurationExt};

use crate::provider::FeedProvider;

/// Configuration for one converter.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Feed provider and wire format.
    pub provider: FeedProvider,
    /// Feed locator; the provider default when unset.
    pub feed_url: Option<String>,
    /// Proxy URL for HTTP fetches.
    pub proxy: Option<String>,
    /// Timeout for a single fetch.
    pub request_timeout: Duration,
    /// User agent sent with HTTP fetches.
    pub user_agent: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            provider: FeedProvider::Ecb,
            feed_url: None,
            proxy: None,
            request_timeout: constants::feed_request_timeout().as_std(),
            user_agent: format!("refrate/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ConverterConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(provider) = std::env::var("REFRATE_PROVIDER") {
            if let Ok(provider) = provider.parse() {
                config.provider = provider;
            }
        }

        if let Ok(url) = std::env::var("REFRATE_FEED_URL") {
            if !url.trim().is_empty() {
                config.feed_url = Some(url);
            }
        }

        if let Ok(proxy) = std::env::var("REFRATE_PROXY") {
            if !proxy.trim().is_empty() {
                config.proxy = Some(proxy);
            }
        }

        if let Ok(secs) = std::env::var("REFRATE_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.request_timeout = Duration::from_secs(secs);
            }
        }

        config
    }

    /// Locator the converter fetches from.
    pub fn feed_locator(&self) -> &str {
        self.feed_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_url())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout.is_zero() {
            return Err("Request timeout cannot be 0".to_string());
        }

        if self.feed_locator().trim().is_empty() {
            return Err("Feed URL cannot be empty".to_string());
        }

        if let Some(proxy) = &self.proxy {
            if !proxy.contains("://") {
                return Err(format!("Proxy {proxy:?} must include a scheme"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConverterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.feed_locator(), FeedProvider::Ecb.default_url());
    }

    #[test]
    fn test_feed_url_overrides_provider_default() {
        let config = ConverterConfig {
            provider: FeedProvider::Yahoo,
            feed_url: Some("file:///var/lib/refrate/yahoo.xml".to_string()),
            ..Default::default()
        };
        assert_eq!(config.feed_locator(), "file:///var/lib/refrate/yahoo.xml");
    }

    #[test]
    fn test_invalid_config() {
        let mut config = ConverterConfig::default();
        config.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = ConverterConfig::default();
        config.proxy = Some("proxy.local:3128".to_string());
        assert!(config.validate().is_err());
    }
}

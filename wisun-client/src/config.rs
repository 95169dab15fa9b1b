//! Client configuration

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use wisun_core::{WiSunError, WiSunResult};

pub const DEFAULT_SCAN_RETRIES: u32 = 5;
pub const DEFAULT_GET_TIMEOUT: Duration = Duration::from_millis(8000);
pub const DEFAULT_GET_RETRIES: u32 = 2;
pub const DEFAULT_CACHE_PATH: &str = ".paninfo.json";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300_000);

/// Settings of a [`MeterClient`](crate::MeterClient)
#[derive(Clone)]
pub struct ClientConfig {
    /// Route-B authentication id
    pub route_b_id: String,
    /// Route-B password
    pub route_b_password: String,
    /// Scan attempts before bring-up gives up
    pub scan_retries: u32,
    /// Wait for a correlated response to one GET
    pub get_timeout: Duration,
    /// Extra GET attempts after the first one fails
    pub get_retries: u32,
    /// Where the joined PAN is cached between runs
    pub cache_path: PathBuf,
    /// Interval between two polls of the full catalog
    pub poll_interval: Duration,
}

impl ClientConfig {
    pub fn new(route_b_id: impl Into<String>, route_b_password: impl Into<String>) -> Self {
        Self {
            route_b_id: route_b_id.into(),
            route_b_password: route_b_password.into(),
            scan_retries: DEFAULT_SCAN_RETRIES,
            get_timeout: DEFAULT_GET_TIMEOUT,
            get_retries: DEFAULT_GET_RETRIES,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_scan_retries(mut self, scan_retries: u32) -> Self {
        self.scan_retries = scan_retries;
        self
    }

    pub fn with_get_timeout(mut self, get_timeout: Duration) -> Self {
        self.get_timeout = get_timeout;
        self
    }

    pub fn with_get_retries(mut self, get_retries: u32) -> Self {
        self.get_retries = get_retries;
        self
    }

    pub fn with_cache_path(mut self, cache_path: impl Into<PathBuf>) -> Self {
        self.cache_path = cache_path.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Total GET attempts per fetch
    pub fn get_attempts(&self) -> u32 {
        self.get_retries.saturating_add(1)
    }

    /// Check that the configuration can be used for bring-up
    pub fn validate(&self) -> WiSunResult<()> {
        if self.route_b_id.is_empty() {
            return Err(WiSunError::InvalidConfig("Route-B id is empty".to_string()));
        }
        if self.route_b_password.is_empty() {
            return Err(WiSunError::InvalidConfig(
                "Route-B password is empty".to_string(),
            ));
        }
        if self.scan_retries == 0 {
            return Err(WiSunError::InvalidConfig(
                "scan retries must be at least 1".to_string(),
            ));
        }
        if self.get_timeout.is_zero() {
            return Err(WiSunError::InvalidConfig(
                "GET timeout must be positive".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(WiSunError::InvalidConfig(
                "poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("route_b_id", &self.route_b_id)
            .field("route_b_password", &"********")
            .field("scan_retries", &self.scan_retries)
            .field("get_timeout", &self.get_timeout)
            .field("get_retries", &self.get_retries)
            .field("cache_path", &self.cache_path)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("id", "password");
        assert_eq!(config.scan_retries, 5);
        assert_eq!(config.get_timeout, Duration::from_secs(8));
        assert_eq!(config.get_retries, 2);
        assert_eq!(config.get_attempts(), 3);
        assert_eq!(config.cache_path, PathBuf::from(".paninfo.json"));
        assert_eq!(config.poll_interval, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ClientConfig::new("", "password").validate().is_err());
        assert!(ClientConfig::new("id", "").validate().is_err());
        assert!(
            ClientConfig::new("id", "password")
                .with_scan_retries(0)
                .validate()
                .is_err()
        );
        assert!(
            ClientConfig::new("id", "password")
                .with_get_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_debug_hides_password() {
        let config = ClientConfig::new("id", "secret-password");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-password"));
        assert!(debug.contains("route_b_id"));
    }
}

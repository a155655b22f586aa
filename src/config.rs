//! Configuration for connections and mappings.
//!
//! Configuration is passed to [`Connection::new()`](crate::Connection::new)
//! and [`SyncedMap::new()`](crate::SyncedMap::new) and can be constructed
//! programmatically or deserialized from YAML/JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use redis_mirror::config::{ConnectConfig, MapConfig};
//!
//! let conn = ConnectConfig::new("redis://localhost:6379");
//! let map = MapConfig {
//!     name: "cache-apps".into(),
//!     ..Default::default()
//! };
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! url: "redis://cache.internal:6379"
//! connect_timeout: "10s"
//!
//! # per mapping:
//! name: "cache-apps"
//! sync: true
//! ```

use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// URL schemes the store client understands.
const VALID_SCHEMES: [&str; 3] = ["redis://", "rediss://", "redis+unix:"];

// ═══════════════════════════════════════════════════════════════════════════════
// ConnectConfig: passed to Connection::new()
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for a store connection.
///
/// # Fields
///
/// - `url`: Store URL. Must carry a recognized scheme, validated up front.
/// - `connect_timeout`: How long to wait for both channels to open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectConfig {
    /// Store URL, e.g. `"redis://localhost:6379"`.
    pub url: String,

    /// Channel-open timeout as a duration string (e.g., "10s").
    /// Parsed to Duration internally.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    /// Capacity of the pushed-message bus shared by all mappings on this
    /// connection. Mappings whose apply loop falls this far behind drop the
    /// oldest events (broadcast lag) and log it.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_connect_timeout() -> String {
    "10s".to_string()
}

fn default_event_capacity() -> usize {
    1024
}

impl ConnectConfig {
    /// Create a config for the given URL with default timeouts.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: default_connect_timeout(),
            event_capacity: default_event_capacity(),
        }
    }

    /// Validate that the URL carries a recognized scheme.
    ///
    /// Connection errors for reachable-but-broken stores surface later; this
    /// catches the configuration mistakes that can never connect.
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(MirrorError::InvalidConfiguration(
                "store URL is empty".to_string(),
            ));
        }
        if !VALID_SCHEMES.iter().any(|s| self.url.starts_with(s)) {
            return Err(MirrorError::InvalidConfiguration(format!(
                "unrecognized store URL scheme: {}",
                self.url
            )));
        }
        Ok(())
    }

    /// Parse the connect_timeout string to a Duration.
    pub fn connect_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.connect_timeout).unwrap_or(Duration::from_secs(10))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MapConfig: one per synchronized mapping
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for a single synchronized mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Namespace name. Doubles as the remote mirror key and the change topic.
    #[serde(default = "default_name")]
    pub name: String,

    /// Whether to perform a one-shot bootstrap sync at construction.
    #[serde(default = "default_true")]
    pub sync: bool,
}

fn default_name() -> String {
    "redis-map".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            sync: true,
        }
    }
}

impl MapConfig {
    /// Create a config with the given namespace name and defaults otherwise.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create a config for testing: named, no bootstrap sync.
    pub fn for_testing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sync: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_known_schemes() {
        assert!(ConnectConfig::new("redis://localhost:6379").validate().is_ok());
        assert!(ConnectConfig::new("rediss://cache.internal:6380").validate().is_ok());
        assert!(ConnectConfig::new("redis+unix:///var/run/redis.sock").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_scheme() {
        let err = ConnectConfig::new("http://localhost:6379").validate().unwrap_err();
        assert!(matches!(err, MirrorError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("http://localhost:6379"));
    }

    #[test]
    fn test_validate_rejects_empty_url() {
        let err = ConnectConfig::new("").validate().unwrap_err();
        assert!(matches!(err, MirrorError::InvalidConfiguration(_)));
    }

    fn with_timeout(timeout: &str) -> ConnectConfig {
        ConnectConfig {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: timeout.to_string(),
            event_capacity: default_event_capacity(),
        }
    }

    #[test]
    fn test_connect_timeout_parsing() {
        assert_eq!(
            with_timeout("2s").connect_timeout_duration(),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_connect_timeout_various_formats() {
        let test_cases = [
            ("5s", Duration::from_secs(5)),
            ("1m", Duration::from_secs(60)),
            ("500ms", Duration::from_millis(500)),
        ];

        for (input, expected) in test_cases {
            assert_eq!(
                with_timeout(input).connect_timeout_duration(),
                expected,
                "Failed for input: {}",
                input
            );
        }
    }

    #[test]
    fn test_connect_timeout_invalid_fallback() {
        // Should fall back to 10 seconds
        assert_eq!(
            with_timeout("invalid").connect_timeout_duration(),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_map_config_default() {
        let config = MapConfig::default();
        assert_eq!(config.name, "redis-map");
        assert!(config.sync);
    }

    #[test]
    fn test_map_config_named() {
        let config = MapConfig::named("cache-apps");
        assert_eq!(config.name, "cache-apps");
        assert!(config.sync);
    }

    #[test]
    fn test_map_config_for_testing() {
        let config = MapConfig::for_testing("test-ns");
        assert_eq!(config.name, "test-ns");
        assert!(!config.sync);
    }

    #[test]
    fn test_map_config_serde_defaults() {
        // An empty object deserializes to the documented defaults
        let config: MapConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.name, "redis-map");
        assert!(config.sync);
    }

    #[test]
    fn test_connect_config_json_roundtrip() {
        let config = ConnectConfig {
            url: "redis://roundtrip:6379".to_string(),
            connect_timeout: "3s".to_string(),
            event_capacity: 256,
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: ConnectConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.url, "redis://roundtrip:6379");
        assert_eq!(parsed.connect_timeout, "3s");
    }
}

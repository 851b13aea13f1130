use crate::constants;
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from data/config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// Portal server endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the portal (REST lives under <portal_url>/api/)
    pub portal_url: String,
    /// REST request timeout
    pub api_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            portal_url: "http://localhost:8000".to_string(),
            api_timeout_secs: 15,
        }
    }
}

/// Realtime engine tuning. Defaults are the deployment values; tests
/// shrink the timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Master switch; when false every consumer polls
    pub enabled: bool,
    /// Optional host[:port] override for the realtime endpoint
    #[serde(default)]
    pub ws_host: Option<String>,
    /// Endpoint path suffixes tried in order across attempts
    pub endpoint_suffixes: Vec<String>,
    pub max_connection_attempts: u32,
    pub connect_timeout_ms: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_cap_ms: u64,
    pub control_debounce_ms: u64,
    pub poll_interval_ms: u64,
    pub status_poll_interval_ms: u64,
    pub direct_max_retries: u32,
    pub direct_retry_delay_ms: u64,
    pub message_history_limit: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ws_host: None,
            endpoint_suffixes: constants::ENDPOINT_SUFFIX_FALLBACKS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_connection_attempts: constants::MAX_CONNECTION_ATTEMPTS,
            connect_timeout_ms: constants::CONNECT_TIMEOUT_MS,
            reconnect_base_ms: constants::RECONNECT_BASE_MS,
            reconnect_cap_ms: constants::RECONNECT_CAP_MS,
            control_debounce_ms: constants::CONTROL_DEBOUNCE_MS,
            poll_interval_ms: constants::POLL_INTERVAL_MS,
            status_poll_interval_ms: constants::STATUS_POLL_INTERVAL_MS,
            direct_max_retries: constants::DIRECT_MAX_RETRIES,
            direct_retry_delay_ms: constants::DIRECT_RETRY_DELAY_MS,
            message_history_limit: constants::MESSAGE_HISTORY_LIMIT,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.portal_url, "http://localhost:8000");
        assert_eq!(config.realtime.max_connection_attempts, 5);
        assert_eq!(config.realtime.reconnect_cap_ms, 15_000);
        assert_eq!(
            config.realtime.endpoint_suffixes,
            vec!["updates", "live", "socket"]
        );
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[realtime]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.realtime.poll_interval_ms, config.realtime.poll_interval_ms);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: Config = toml::from_str("[server]\nportal_url = \"https://portal.example.edu\"\napi_timeout_secs = 5\n").unwrap();
        assert_eq!(parsed.server.portal_url, "https://portal.example.edu");
        assert_eq!(parsed.realtime.connect_timeout_ms, 10_000);
    }
}

//! Per-user settings store
//!
//! The realtime session needs exactly two things from user settings: the
//! auth credential (if any) and the "disable realtime" preference. Both
//! come through this narrow trait so hosting applications can back it
//! with whatever persistence they already have.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Key under which the portal auth token is stored
pub const AUTH_TOKEN_KEY: &str = "portal_auth_token";

/// Key for the user preference disabling realtime delivery
pub const REALTIME_DISABLED_KEY: &str = "realtime_disabled";

/// Narrow key-value lookup consumed by the realtime engine
pub trait SettingsStore: Send + Sync {
    /// Fetch a stored value, None when absent
    fn get(&self, key: &str) -> Option<String>;

    /// Interpret a stored value as a boolean flag
    fn flag(&self, key: &str) -> bool {
        matches!(
            self.get(key).as_deref(),
            Some("1") | Some("true") | Some("yes")
        )
    }
}

/// Environment-backed settings: keys map to uppercased env vars
/// (`portal_auth_token` -> `PORTAL_AUTH_TOKEN`)
#[derive(Debug, Default)]
pub struct EnvSettings;

impl SettingsStore for EnvSettings {
    fn get(&self, key: &str) -> Option<String> {
        let var = key.to_uppercase();
        std::env::var(var).ok().filter(|v| !v.is_empty())
    }
}

/// In-memory settings for tests and embedded hosts
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_settings() {
        let settings = MemorySettings::new();
        assert_eq!(settings.get(AUTH_TOKEN_KEY), None);

        settings.set(AUTH_TOKEN_KEY, "tok123");
        assert_eq!(settings.get(AUTH_TOKEN_KEY).as_deref(), Some("tok123"));

        settings.set(REALTIME_DISABLED_KEY, "true");
        assert!(settings.flag(REALTIME_DISABLED_KEY));

        settings.remove(AUTH_TOKEN_KEY);
        assert_eq!(settings.get(AUTH_TOKEN_KEY), None);
    }

    #[test]
    fn test_flag_parsing() {
        let settings = MemorySettings::new();
        settings.set("f", "0");
        assert!(!settings.flag("f"));
        settings.set("f", "1");
        assert!(settings.flag("f"));
        assert!(!settings.flag("missing"));
    }
}

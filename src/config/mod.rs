//! Configuration system for unilive
//!
//! TOML-backed configuration (`data/config.toml`) with a process-wide
//! instance and thread-safe access helpers, plus the `SettingsStore`
//! abstraction for per-user credentials and preferences.

mod schemas;
mod settings;
mod utils;

pub use schemas::{Config, RealtimeConfig, ServerConfig};
pub use settings::{
    EnvSettings, MemorySettings, SettingsStore, AUTH_TOKEN_KEY, REALTIME_DISABLED_KEY,
};
pub use utils::{
    get_config_clone, is_config_initialized, load_config, load_config_from_path, with_config,
    CONFIG_FILE_PATH,
};

use super::schemas::Config;
/// Configuration utilities - loading and thread-safe access helpers
use once_cell::sync::OnceCell;
use std::sync::RwLock;

/// Global configuration instance
///
/// Single source of truth for configuration values; access it through the
/// helpers below.
pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

/// Default configuration file path
pub const CONFIG_FILE_PATH: &str = "data/config.toml";

/// Load configuration from disk and initialize the global CONFIG
///
/// Call once at startup. Falls back to defaults when the file is missing.
pub fn load_config() -> Result<(), String> {
    load_config_from_path(CONFIG_FILE_PATH)
}

/// Load configuration from a specific file path
pub fn load_config_from_path(path: &str) -> Result<(), String> {
    let config = if std::path::Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path, e))?;

        toml::from_str::<Config>(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path, e))?
    } else {
        eprintln!("Config file '{}' not found, using default values", path);
        Config::default()
    };

    CONFIG
        .set(RwLock::new(config))
        .map_err(|_| "Config already initialized".to_string())?;

    Ok(())
}

/// Execute a function with read access to the configuration
///
/// The recommended way to read configuration values; the closure receives
/// an immutable reference to the Config.
pub fn with_config<F, R>(f: F) -> R
where
    F: FnOnce(&Config) -> R,
{
    let config_lock = CONFIG
        .get()
        .expect("Config not initialized. Call load_config() first.");

    let config = config_lock
        .read()
        .expect("Failed to acquire config read lock");

    f(&config)
}

/// Get a clone of the entire configuration
///
/// Useful when config values must be held across await points. Clones the
/// whole struct; prefer with_config() for simple reads.
pub fn get_config_clone() -> Config {
    with_config(|cfg| cfg.clone())
}

/// Check if configuration has been initialized
pub fn is_config_initialized() -> bool {
    CONFIG.get().is_some()
}

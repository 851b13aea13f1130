/// Logger configuration and filtering state
///
/// Holds the minimum level threshold and the set of tags with debug mode
/// enabled, populated from command-line flags at init time.
use super::levels::LogLevel;
use super::tags::LogTag;
use crate::arguments;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Minimum level shown (errors always pass)
    pub min_level: LogLevel,
    /// Tags with --debug-<tag> enabled
    pub debug_tags: HashSet<String>,
    /// If non-empty, only these tags are shown at all
    pub enabled_tags: HashSet<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
            enabled_tags: HashSet::new(),
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

/// Snapshot of the current logger configuration
pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG.read().clone()
}

/// Replace the logger configuration wholesale (tests, embedding hosts)
pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write() = config;
}

/// Scan the argument store for logging flags.
///
/// Recognized: --debug-<module>, --verbose, --quiet.
pub fn init_from_args() {
    let mut config = LoggerConfig::default();

    for arg in arguments::get_cmd_args() {
        if let Some(tag) = arg.strip_prefix("--debug-") {
            config.debug_tags.insert(tag.to_lowercase());
        } else if arg == "--verbose" {
            config.min_level = LogLevel::Verbose;
        } else if arg == "--quiet" {
            config.min_level = LogLevel::Warning;
        }
    }

    set_logger_config(config);
}

/// Whether debug output is enabled for a tag
pub fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    LOGGER_CONFIG.read().debug_tags.contains(&tag.to_debug_key())
}

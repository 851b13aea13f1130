/// Core logging implementation with automatic filtering
///
/// Filtering rules:
/// 1. Errors are always shown
/// 2. Check against minimum log level threshold
/// 3. Debug level requires --debug-<module> flag for that tag
/// 4. Verbose level requires --verbose
/// 5. If enabled_tags is non-empty, the tag must be in the set

use super::config::{get_logger_config, is_debug_enabled_for_tag};
use super::levels::LogLevel;
use super::tags::LogTag;

/// Check if a log message should be displayed
pub fn should_log(tag: &LogTag, level: LogLevel) -> bool {
    let config = get_logger_config();

    // Rule 1: Errors always log
    if level == LogLevel::Error {
        return true;
    }

    // Rule 2: Minimum level threshold
    if level > config.min_level && level != LogLevel::Debug {
        return false;
    }

    // Rule 3: Debug requires the per-tag flag (independent of threshold)
    if level == LogLevel::Debug {
        return is_debug_enabled_for_tag(tag);
    }

    // Rule 5: Tag allow-list (empty set = all enabled)
    if !config.enabled_tags.is_empty() && !config.enabled_tags.contains(&tag.to_debug_key()) {
        return false;
    }

    true
}

/// Internal logging function with automatic filtering
pub fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    if !should_log(&tag, level) {
        return;
    }

    super::format::format_and_log(tag, level.as_str(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::config::{set_logger_config, LoggerConfig};

    #[test]
    fn test_filtering_rules() {
        let mut config = LoggerConfig::default();
        config.debug_tags.insert("realtime".to_string());
        set_logger_config(config);

        // Errors always pass
        assert!(should_log(&LogTag::Api, LogLevel::Error));
        // Info passes at the default threshold
        assert!(should_log(&LogTag::Api, LogLevel::Info));
        // Verbose is above the default threshold
        assert!(!should_log(&LogTag::Api, LogLevel::Verbose));
        // Debug is gated per tag
        assert!(should_log(&LogTag::Realtime, LogLevel::Debug));
        assert!(!should_log(&LogTag::Api, LogLevel::Debug));

        set_logger_config(LoggerConfig::default());
    }
}

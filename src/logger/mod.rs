//! Structured logging for unilive
//!
//! Console logger with:
//! - Automatic debug mode filtering from command-line arguments
//! - Standard log levels (Error/Warning/Info/Debug/Verbose)
//! - Per-module debug control via --debug-<module> flags
//! - Colored, column-aligned output
//!
//! ## Usage
//!
//! ```rust
//! use unilive::logger::{self, LogTag};
//!
//! logger::error(LogTag::Realtime, "Connection failed");
//! logger::info(LogTag::Poller, "Falling back to polling");
//! logger::debug(LogTag::Api, "Request details: ..."); // Only with --debug-api
//! ```
//!
//! Call `logger::init()` once at startup so --debug-<module> and --verbose
//! flags are picked up from the argument store.

mod config;
mod core;
mod format;
mod levels;
mod tags;

pub use config::{get_logger_config, init_from_args, set_logger_config, LoggerConfig};
pub use levels::LogLevel;
pub use tags::LogTag;

/// Initialize the logger system
///
/// Scans the argument store for --debug-<module>, --verbose and --quiet
/// flags and configures filtering accordingly. Call once at startup,
/// after `arguments::set_cmd_args` if the binary overrides them.
pub fn init() {
    config::init_from_args();
}

/// Log at ERROR level (always shown, critical issues)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level (important issues that aren't critical)
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level (standard operational messages)
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level (only shown with --debug-<module> for the tag)
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level (only shown with --verbose)
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

/// Centralized argument handling for unilive binaries
///
/// Consolidates command-line argument storage and debug flag checking so
/// the logger and binaries read from one place.
///
/// Features:
/// - Centralized CMD_ARGS storage with thread-safe access
/// - Debug flag checking functions per module
/// - Support for both binary-specific and library consumers
use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

/// Global command-line arguments storage
/// Thread-safe singleton that stores arguments for access throughout the application
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Sets the global command-line arguments
/// Used by binaries and tests to override the default env::args() collection
pub fn set_cmd_args(args: Vec<String>) {
    if let Ok(mut cmd_args) = CMD_ARGS.lock() {
        *cmd_args = args;
    }
}

/// Gets a copy of the current command-line arguments
pub fn get_cmd_args() -> Vec<String> {
    match CMD_ARGS.lock() {
        Ok(args) => args.clone(),
        Err(_) => env::args().collect(),
    }
}

/// Checks if a specific argument is present in the command line
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

/// Gets the value of a command-line argument that follows a flag
/// Returns None if the flag is not found or has no value
pub fn get_arg_value(flag: &str) -> Option<String> {
    let args = get_cmd_args();
    for (i, arg) in args.iter().enumerate() {
        if arg == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

/// Gets every value of a repeatable flag (e.g. --channel a --channel b)
pub fn get_arg_values(flag: &str) -> Vec<String> {
    let args = get_cmd_args();
    let mut values = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        if arg == flag && i + 1 < args.len() {
            values.push(args[i + 1].clone());
        }
    }
    values
}

// =============================================================================
// DEBUG FLAG CHECKING FUNCTIONS
// =============================================================================

/// Realtime session debug mode
pub fn is_debug_realtime_enabled() -> bool {
    has_arg("--debug-realtime")
}

/// Channel registry/dispatch debug mode
pub fn is_debug_channels_enabled() -> bool {
    has_arg("--debug-channels")
}

/// Fallback poller debug mode
pub fn is_debug_poller_enabled() -> bool {
    has_arg("--debug-poller")
}

/// REST API debug mode
pub fn is_debug_api_enabled() -> bool {
    has_arg("--debug-api")
}

/// Verbose output across all modules
pub fn is_verbose_enabled() -> bool {
    has_arg("--verbose")
}

/// Help requested
pub fn is_help_requested() -> bool {
    has_arg("--help") || has_arg("-h")
}

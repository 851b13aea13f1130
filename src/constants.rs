/// Global constants used across unilive
///
/// System-wide defaults for the realtime engine. Everything here can be
/// overridden per-session through `RealtimeConfig`; these are the values
/// the portal deployment runs with.

/// Maximum automatic connection attempts before the session gives up
pub const MAX_CONNECTION_ATTEMPTS: u32 = 5;

/// Connection establishment timeout in milliseconds
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Reconnect backoff: base delay, growth factor, and cap
pub const RECONNECT_BASE_MS: u64 = 1_000;
pub const RECONNECT_MULTIPLIER: f64 = 1.5;
pub const RECONNECT_CAP_MS: u64 = 15_000;

/// Suppression window for duplicate subscribe/unsubscribe sends per channel
pub const CONTROL_DEBOUNCE_MS: u64 = 1_000;

/// Fallback polling period when real-time delivery is unavailable
pub const POLL_INTERVAL_MS: u64 = 10_000;

/// How often a feed re-checks session status while waiting for auth
pub const STATUS_POLL_INTERVAL_MS: u64 = 1_000;

/// Dedicated-socket (legacy) feed retry limit and delay between tries
pub const DIRECT_MAX_RETRIES: u32 = 3;
pub const DIRECT_RETRY_DELAY_MS: u64 = 3_000;

/// Rolling diagnostic buffer caps
pub const MESSAGE_HISTORY_LIMIT: usize = 50;
pub const EVENT_HISTORY_LIMIT: usize = 100;
pub const ATTEMPT_HISTORY_LIMIT: usize = 20;

/// Endpoint path suffixes tried in order across connection attempts.
/// Different portal deployments mount the realtime endpoint under
/// different paths; each retry falls back to the next plausible one.
pub const ENDPOINT_SUFFIX_FALLBACKS: &[&str] = &["updates", "live", "socket"];

/// Development server port used when the portal runs on localhost
/// without an explicit port (the Django dev server default)
pub const DEV_DEFAULT_PORT: u16 = 8000;

/// Environment variable overriding the realtime host ("host" or "host:port")
pub const WS_HOST_ENV: &str = "UNILIVE_WS_HOST";

/// WebSocket close codes the engine branches on
pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_ABNORMAL: u16 = 1006;

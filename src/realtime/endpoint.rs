//! Realtime endpoint resolution
//!
//! Builds `ws(s)://host[:port]/ws/<suffix>/` from the portal base URL, an
//! optional host override (config or `UNILIVE_WS_HOST`), and the attempt
//! number. The scheme follows the portal scheme (`https` -> `wss`), and
//! localhost without an explicit port gets the dev server port.

use super::session::SessionConfig;
use crate::constants;
use crate::errors::{LiveError, LiveResult};
use url::Url;

/// Resolve the shared-session endpoint for a given connection attempt.
///
/// The first attempt uses suffix 0; later attempts progressively fall
/// back through the configured suffix list, clamped to the last entry.
pub fn resolve_ws_url(cfg: &SessionConfig, attempt: u32) -> LiveResult<String> {
    let env = std::env::var(constants::WS_HOST_ENV)
        .ok()
        .filter(|v| !v.is_empty());
    resolve_ws_url_with(cfg, attempt, env.as_deref())
}

/// Resolve the dedicated endpoint for a route-scoped socket
pub fn resolve_route_url(cfg: &SessionConfig, route: &str) -> LiveResult<String> {
    let env = std::env::var(constants::WS_HOST_ENV)
        .ok()
        .filter(|v| !v.is_empty());
    let (scheme, authority) = resolve_authority(cfg, env.as_deref())?;
    Ok(format!("{}://{}/ws/{}/", scheme, authority, route))
}

pub(crate) fn resolve_ws_url_with(
    cfg: &SessionConfig,
    attempt: u32,
    host_override: Option<&str>,
) -> LiveResult<String> {
    let suffixes = &cfg.realtime.endpoint_suffixes;
    if suffixes.is_empty() {
        return Err(LiveError::Config(
            "realtime.endpoint_suffixes must not be empty".to_string(),
        ));
    }
    let index = (attempt.saturating_sub(1) as usize).min(suffixes.len() - 1);
    let (scheme, authority) = resolve_authority(cfg, host_override)?;
    Ok(format!("{}://{}/ws/{}/", scheme, authority, suffixes[index]))
}

/// Pick scheme and host[:port] from the override chain:
/// env/config override first, then the portal URL host.
fn resolve_authority(cfg: &SessionConfig, host_override: Option<&str>) -> LiveResult<(&'static str, String)> {
    let portal = Url::parse(&cfg.portal_url)
        .map_err(|e| LiveError::Endpoint(format!("invalid portal_url '{}': {}", cfg.portal_url, e)))?;

    let scheme = if portal.scheme() == "https" { "wss" } else { "ws" };

    let configured = host_override
        .map(|s| s.to_string())
        .or_else(|| cfg.realtime.ws_host.clone());

    let authority = match configured {
        Some(hostport) if hostport.contains(':') => hostport,
        Some(host) => with_dev_port(&host, None),
        None => {
            let host = portal
                .host_str()
                .ok_or_else(|| LiveError::Endpoint("portal_url has no host".to_string()))?;
            with_dev_port(host, portal.port())
        }
    };

    Ok((scheme, authority))
}

/// Localhost without an explicit port means the dev server
fn with_dev_port(host: &str, port: Option<u16>) -> String {
    match port {
        Some(p) => format!("{}:{}", host, p),
        None if host == "localhost" || host == "127.0.0.1" => {
            format!("{}:{}", host, constants::DEV_DEFAULT_PORT)
        }
        None => host.to_string(),
    }
}

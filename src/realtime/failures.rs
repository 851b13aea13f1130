//! Process-wide route failure cache
//!
//! Routes land here when real-time delivery has been abandoned for them:
//! missing server endpoint, exhausted retries, or an explicit error
//! signal. The set is append-only for the process lifetime; a restart is
//! the only way back to real-time for a failed route. Feeds consult it
//! before every new real-time attempt so doomed connections are never
//! retried.

use crate::logger::{self, LogTag};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;

static FAILED_ROUTES: Lazy<RwLock<HashSet<String>>> = Lazy::new(|| RwLock::new(HashSet::new()));

/// Mark a route as unusable for real-time delivery
pub fn mark_route_failed(route: &str, reason: &str) {
    let inserted = FAILED_ROUTES.write().insert(route.to_string());
    if inserted {
        logger::warning(
            LogTag::Realtime,
            &format!("Route '{}' marked unusable for realtime: {}", route, reason),
        );
    }
}

/// Whether real-time delivery has been abandoned for a route
pub fn is_route_failed(route: &str) -> bool {
    FAILED_ROUTES.read().contains(route)
}

/// Snapshot of all failed routes (sorted for stable output)
pub fn failed_routes() -> Vec<String> {
    let mut routes: Vec<String> = FAILED_ROUTES.read().iter().cloned().collect();
    routes.sort();
    routes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_check() {
        assert!(!is_route_failed("failures-test-route"));
        mark_route_failed("failures-test-route", "no route");
        assert!(is_route_failed("failures-test-route"));

        // Marking twice is harmless
        mark_route_failed("failures-test-route", "again");
        assert!(failed_routes().contains(&"failures-test-route".to_string()));
    }
}

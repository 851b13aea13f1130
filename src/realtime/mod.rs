//! Realtime engine: shared session, channel registry, fallback polling
//!
//! One `RealtimeSession` per process, constructed at startup and injected
//! into consumers. `LiveFeed` is what most consumers want: data for a
//! route, kept fresh over the session's channels or by polling. The
//! `DirectFeed` legacy path keeps a dedicated socket per route.

pub mod debug;
pub mod direct;
pub mod endpoint;
pub mod failures;
pub mod messages;
pub mod poller;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use debug::DebugInfo;
pub use direct::{DirectFeed, DirectOptions};
pub use failures::{failed_routes, is_route_failed, mark_route_failed};
pub use messages::{ClientMessage, ServerMessage};
pub use poller::{FeedMode, FeedOptions, Fetcher, LiveFeed};
pub use session::{ObserverHandle, RealtimeSession, SessionConfig, Subscription};
pub use state::ConnectionState;

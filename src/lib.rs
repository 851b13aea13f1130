//! unilive - real-time data layer for the UniHub society/events portal
//!
//! The portal frontend is mostly CRUD screens backed by REST. This crate
//! carries the one piece with real machinery: a single persistent WebSocket
//! session that authenticates, multiplexes channel subscriptions, recovers
//! from drops with bounded backoff, and degrades to interval polling when
//! real-time delivery is unavailable for a route.

pub mod api;
pub mod arguments;
pub mod config;
pub mod constants;
pub mod errors;
pub mod logger;
pub mod realtime;

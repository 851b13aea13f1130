//! Thin REST collaborators for the portal
//!
//! The realtime engine only needs "an async function returning the
//! current list" per route; these are those functions for the portal's
//! resources, plus the shared HTTP client they run on.

mod client;
mod portal;

pub use client::ApiClient;
pub use portal::PortalApi;

//! # Storefront payment server
//!
//! The HTTP surface in front of the storefront payment engine. It is responsible for:
//! * accepting checkouts and creating provider payment intents,
//! * authenticating and reconciling payment callbacks and webhooks,
//! * streaming live order updates to dashboards over server-sent events,
//! * running the background worker that expires orders whose payment window lapses.
//!
//! ## Configuration
//! The server is configured via `SPG_`-prefixed environment variables. See [config](config/index.html).

pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod integrations;
pub mod routes;
pub mod server;
pub mod sse;

#[cfg(test)]
mod endpoint_tests;

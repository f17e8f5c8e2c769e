//! # Storefront payment engine public API
//!
//! The `api` module exposes the programmatic API for the storefront payment engine. The API is modular: an API
//! instance is created by supplying a database backend implementing [`crate::traits::StorefrontDatabase`] (usually
//! the [`crate::PersistenceFacade`]) and, where payments are involved, a [`crate::traits::PaymentGateway`].
//!
//! * [`OrderFlowApi`] drives the order lifecycle: checkout, payment intents, capture reconciliation, expiry and
//!   seller status updates.
//! * [`SettingsApi`] reads and writes operator-facing configuration values.

mod errors;
mod order_flow_api;
pub mod order_objects;
mod settings_api;

pub use errors::OrderFlowError;
pub use order_flow_api::OrderFlowApi;
pub use settings_api::SettingsApi;

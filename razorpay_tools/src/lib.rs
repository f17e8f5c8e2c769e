//! A thin client for the Razorpay REST API.
//!
//! Covers exactly the surface the storefront needs: creating payment-provider orders, issuing refunds, and the wire
//! types for webhook envelopes. Signature verification is not here; it is a local HMAC computation and lives with the
//! engine's helpers.

mod api;
mod config;
mod data_objects;
mod error;

pub use api::RazorpayApi;
pub use config::RazorpayConfig;
pub use data_objects::{PaymentEntity, RazorpayOrder, RazorpayRefund, WebhookEnvelope};
pub use error::RazorpayApiError;

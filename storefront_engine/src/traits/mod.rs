mod data_objects;
mod payment_gateway;
mod storefront_database;

pub use data_objects::{ConfirmOutcome, ExpiryResult, PaymentEvent, ReconcileOutcome};
pub use payment_gateway::{GatewayError, PaymentGateway};
pub use storefront_database::{StoreError, StorefrontDatabase};

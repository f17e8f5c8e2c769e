use spg_common::MinorUnits;
use thiserror::Error;

/// The narrow interface onto the hosted payment provider.
///
/// The adapter holds no persisted state of its own; everything it does is a remote call. Signature verification for
/// callbacks and webhooks is a local HMAC computation and lives in [`crate::helpers`] instead.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway: Clone {
    /// Creates a payment intent for the given amount (in the currency's minor unit) and returns the provider-side
    /// order id. The `reference` ties the intent back to our order for later reconciliation.
    async fn create_intent(&self, amount: MinorUnits, currency: &str, reference: &str)
        -> Result<String, GatewayError>;

    /// Issues a refund for a captured payment and returns the provider-side refund id.
    ///
    /// A payment that has already been refunded fails with [`GatewayError::AlreadyRefunded`], which callers must be
    /// able to tell apart from [`GatewayError::NetworkError`] when deciding whether to retry.
    async fn refund(&self, payment_id: &str) -> Result<String, GatewayError>;
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Payment amounts must be a positive number of minor currency units, not {0}")]
    InvalidAmount(i64),
    #[error("Payment {0} has already been refunded")]
    AlreadyRefunded(String),
    #[error("Could not reach the payment provider: {0}")]
    NetworkError(String),
    #[error("Payment provider rejected the request. Error {status}. {message}")]
    ApiError { status: u16, message: String },
    #[error("Could not initialize the gateway client: {0}")]
    Initialization(String),
}

//! The Razorpay implementation of the engine's [`PaymentGateway`] trait.

use razorpay_tools::{RazorpayApi, RazorpayApiError, RazorpayConfig};
use spg_common::MinorUnits;
use storefront_engine::traits::{GatewayError, PaymentGateway};

#[derive(Clone)]
pub struct RazorpayGateway {
    api: RazorpayApi,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Result<Self, GatewayError> {
        let api = RazorpayApi::new(config).map_err(|e| GatewayError::Initialization(e.to_string()))?;
        Ok(Self { api })
    }
}

impl PaymentGateway for RazorpayGateway {
    async fn create_intent(
        &self,
        amount: MinorUnits,
        currency: &str,
        reference: &str,
    ) -> Result<String, GatewayError> {
        let order = self.api.create_order(amount.value(), currency, reference).await.map_err(convert_error)?;
        Ok(order.id)
    }

    async fn refund(&self, payment_id: &str) -> Result<String, GatewayError> {
        let refund = self.api.refund_payment(payment_id).await.map_err(convert_error)?;
        Ok(refund.id)
    }
}

fn convert_error(e: RazorpayApiError) -> GatewayError {
    match e {
        RazorpayApiError::AlreadyRefunded(id) => GatewayError::AlreadyRefunded(id),
        RazorpayApiError::InvalidCurrencyAmount(v) => GatewayError::InvalidAmount(v),
        RazorpayApiError::QueryError { status, message } => GatewayError::ApiError { status, message },
        RazorpayApiError::Initialization(m) => GatewayError::Initialization(m),
        RazorpayApiError::RestResponseError(m) | RazorpayApiError::JsonError(m) => GatewayError::NetworkError(m),
    }
}

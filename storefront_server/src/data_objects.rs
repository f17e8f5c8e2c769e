//! Request and response shapes for the HTTP surface.

use serde::{Deserialize, Serialize};
use storefront_engine::{
    db_types::{FullOrder, OrderStatus},
    traits::PaymentEvent,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self { success: false, message: message.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCreateRequest {
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpireOrderRequest {
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsStreamParams {
    pub key: String,
}

/// The response to a payment-creation request: everything the storefront needs to open the provider's checkout flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentResult {
    pub order_id: String,
    pub provider_order_id: String,
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
}

/// The synchronous callback posted by the buyer's browser after the provider's checkout flow completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryParams {
    pub user_id: Option<String>,
    pub store_id: Option<String>,
    pub status: Option<OrderStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub orders: Vec<FullOrder>,
    pub total: usize,
}

/// Converts a provider webhook envelope into the engine's payment event.
///
/// Unknown event types and envelopes without a payment entity become [`PaymentEvent::Other`]; the reconciler
/// acknowledges them without doing anything, which is exactly what the provider expects.
pub fn payment_event_from_envelope(envelope: &razorpay_tools::WebhookEnvelope) -> PaymentEvent {
    let entity = match envelope.payment_entity() {
        Some(e) => e,
        None => return PaymentEvent::Other { event: envelope.event.clone() },
    };
    let provider_order_id = match entity.order_id.clone() {
        Some(id) => id,
        None => return PaymentEvent::Other { event: envelope.event.clone() },
    };
    match envelope.event.as_str() {
        "payment.captured" => PaymentEvent::Captured { provider_order_id, payment_id: entity.id.clone() },
        "payment.failed" => PaymentEvent::Failed {
            provider_order_id,
            payment_id: entity.id.clone(),
            reason: entity
                .error_description
                .clone()
                .or_else(|| entity.error_code.clone())
                .unwrap_or_else(|| "Payment failed".to_string()),
        },
        _ => PaymentEvent::Other { event: envelope.event.clone() },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn captured_envelope_maps_to_captured_event() {
        let envelope: razorpay_tools::WebhookEnvelope = serde_json::from_str(
            r#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_1","order_id":"order_1"}}}}"#,
        )
        .unwrap();
        let event = payment_event_from_envelope(&envelope);
        assert_eq!(event, PaymentEvent::Captured {
            provider_order_id: "order_1".into(),
            payment_id: "pay_1".into()
        });
    }

    #[test]
    fn failed_envelope_carries_the_reason() {
        let envelope: razorpay_tools::WebhookEnvelope = serde_json::from_str(
            r#"{"event":"payment.failed","payload":{"payment":{"entity":{
                "id":"pay_1","order_id":"order_1","error_description":"Card declined"}}}}"#,
        )
        .unwrap();
        match payment_event_from_envelope(&envelope) {
            PaymentEvent::Failed { reason, .. } => assert_eq!(reason, "Card declined"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn untracked_events_map_to_other() {
        let envelope: razorpay_tools::WebhookEnvelope =
            serde_json::from_str(r#"{"event":"invoice.paid","payload":{}}"#).unwrap();
        assert_eq!(payment_event_from_envelope(&envelope), PaymentEvent::Other { event: "invoice.paid".into() });
    }
}

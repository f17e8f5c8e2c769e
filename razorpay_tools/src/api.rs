use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::RazorpayConfig,
    data_objects::{RazorpayOrder, RazorpayRefund},
    RazorpayApiError,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct RazorpayApi {
    config: RazorpayConfig,
    client: Arc<Client>,
}

impl RazorpayApi {
    pub fn new(config: RazorpayConfig) -> Result<Self, RazorpayApiError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RazorpayApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<T, RazorpayApiError> {
        let url = self.url(path);
        trace!("Sending REST query: {url}");
        let mut req = self
            .client
            .request(method, url)
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.reveal()));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| RazorpayApiError::RestResponseError(e.to_string()))?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| RazorpayApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| RazorpayApiError::RestResponseError(e.to_string()))?;
            Err(RazorpayApiError::QueryError { status, message })
        }
    }

    /// Creates a provider-side order for the given amount in minor currency units. The `receipt` ties it back to our
    /// order id.
    pub async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<RazorpayOrder, RazorpayApiError> {
        if amount <= 0 {
            return Err(RazorpayApiError::InvalidCurrencyAmount(amount));
        }
        let body = serde_json::json!({
            "amount": amount,
            "currency": currency,
            "receipt": receipt,
        });
        debug!("Creating provider order for receipt {receipt}");
        let order = self.rest_query::<RazorpayOrder, _>(Method::POST, "/orders", Some(body)).await?;
        info!("Provider order {} created for receipt {receipt}", order.id);
        Ok(order)
    }

    /// Issues a full refund for a captured payment.
    ///
    /// The provider answers a repeat refund with a 400 whose description mentions the payment being fully refunded;
    /// that case is surfaced as [`RazorpayApiError::AlreadyRefunded`] so callers can treat it as settled rather than
    /// failed.
    pub async fn refund_payment(&self, payment_id: &str) -> Result<RazorpayRefund, RazorpayApiError> {
        let path = format!("/payments/{payment_id}/refund");
        debug!("Refunding payment {payment_id}");
        let result =
            self.rest_query::<RazorpayRefund, serde_json::Value>(Method::POST, &path, Some(serde_json::json!({}))).await;
        match result {
            Ok(refund) => {
                info!("Refund {} issued for payment {payment_id}", refund.id);
                Ok(refund)
            },
            Err(RazorpayApiError::QueryError { status: 400, message })
                if message.to_ascii_lowercase().contains("fully refunded") =>
            {
                Err(RazorpayApiError::AlreadyRefunded(payment_id.to_string()))
            },
            Err(e) => Err(e),
        }
    }
}

use log::*;
use spg_common::Secret;

#[derive(Debug, Clone, Default)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub base_url: String,
}

impl RazorpayConfig {
    pub fn new_from_env_or_default() -> Self {
        let key_id = std::env::var("SPG_RAZORPAY_KEY_ID").unwrap_or_else(|_| {
            warn!("SPG_RAZORPAY_KEY_ID not set, using a (probably useless) default");
            "rzp_test_0000000000".to_string()
        });
        let key_secret = Secret::new(std::env::var("SPG_RAZORPAY_KEY_SECRET").unwrap_or_else(|_| {
            warn!("SPG_RAZORPAY_KEY_SECRET not set, using a (probably useless) default");
            "00000000000000".to_string()
        }));
        let webhook_secret = Secret::new(std::env::var("SPG_RAZORPAY_WEBHOOK_SECRET").unwrap_or_else(|_| {
            warn!("SPG_RAZORPAY_WEBHOOK_SECRET not set, using a (probably useless) default");
            "00000000000000".to_string()
        }));
        let base_url = std::env::var("SPG_RAZORPAY_API_URL").unwrap_or_else(|_| {
            debug!("SPG_RAZORPAY_API_URL not set, using the production endpoint");
            "https://api.razorpay.com/v1".to_string()
        });
        Self { key_id, key_secret, webhook_secret, base_url }
    }
}

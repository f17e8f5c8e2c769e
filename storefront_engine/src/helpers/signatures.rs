//! HMAC signature schemes used by the hosted payment provider.
//!
//! Two independent schemes are in play:
//! * The synchronous callback carried by the buyer's browser signs `"{provider_order_id}|{provider_payment_id}"`
//!   with the API key secret.
//! * The asynchronous webhook signs the full raw request body with a separate webhook secret.
//!
//! Both are HMAC-SHA256, hex encoded. Verification decodes the supplied hex and uses the Mac's own constant-time
//! comparison; any malformed or mismatched signature is simply `false`, never an error a caller could mistake for
//! success.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &str, data: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length, so new_from_slice cannot fail
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap_or_else(|_| unreachable!());
    mac.update(data);
    mac
}

fn verify_hex(mac: HmacSha256, signature: &str) -> bool {
    match hex::decode(signature) {
        Ok(sig) => mac.verify_slice(&sig).is_ok(),
        Err(_) => false,
    }
}

/// Verifies the signature of a synchronous payment callback.
pub fn verify_callback_signature(
    provider_order_id: &str,
    provider_payment_id: &str,
    signature: &str,
    secret: &str,
) -> bool {
    let data = format!("{provider_order_id}|{provider_payment_id}");
    verify_hex(mac(secret, data.as_bytes()), signature)
}

/// Verifies the signature of an asynchronous webhook notification against the raw request body.
pub fn verify_webhook_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    verify_hex(mac(secret, body), signature)
}

/// Produces a valid callback signature. The provider does this on its side; we only need it for tests and tooling.
pub fn sign_callback(provider_order_id: &str, provider_payment_id: &str, secret: &str) -> String {
    let data = format!("{provider_order_id}|{provider_payment_id}");
    hex::encode(mac(secret, data.as_bytes()).finalize().into_bytes())
}

/// Produces a valid webhook signature over a raw body.
pub fn sign_webhook(body: &[u8], secret: &str) -> String {
    hex::encode(mac(secret, body).finalize().into_bytes())
}

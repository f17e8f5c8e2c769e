mod ids;
mod signatures;

pub use ids::random_id;
pub use signatures::{sign_callback, sign_webhook, verify_callback_signature, verify_webhook_signature};

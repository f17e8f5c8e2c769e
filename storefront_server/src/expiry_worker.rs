use log::*;
use storefront_engine::{db_types::OrderId, OrderFlowApi};
use tokio::task::JoinHandle;

use crate::{integrations::RazorpayGateway, server::Backend};

/// Starts the payment-window reaper. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_expiry_worker(api: OrderFlowApi<Backend, RazorpayGateway>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        info!("🕰️ Payment window expiry worker started (every {interval_secs}s)");
        loop {
            timer.tick().await;
            trace!("🕰️ Running payment window expiry sweep");
            match api.expire_stale().await {
                Ok(result) => {
                    if result.total_scanned() > 0 {
                        info!(
                            "🕰️ Expiry sweep: {} expired, {} settled in the meantime",
                            result.expired.len(),
                            result.already_settled.len()
                        );
                        debug!("🕰️ Expired orders: {}", order_list(&result.expired));
                    }
                },
                Err(e) => {
                    error!("🕰️ Error running payment window expiry sweep: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[OrderId]) -> String {
    orders.iter().map(|id| id.as_str()).collect::<Vec<&str>>().join(", ")
}

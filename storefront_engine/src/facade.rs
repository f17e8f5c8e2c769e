//! The retry-then-fallback persistence facade.
//!
//! [`PersistenceFacade`] wraps a primary backend and a fallback backend, both [`StorefrontDatabase`]
//! implementations, and is itself one. Every call goes to the primary first, with a per-attempt deadline and a short
//! linear backoff between attempts. Only *transient* failures (infrastructure errors and timeouts) ever reach the
//! fallback; logical errors like a duplicate order id come back to the caller unchanged, because the fallback would
//! answer them no differently.
//!
//! Orders captured while the primary is down are tagged `via_fallback` with the failure that sent them there, so an
//! operator can find and replay them once the primary recovers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    api::order_objects::OrderQueryFilter,
    db_types::{
        Address,
        CasOutcome,
        FullOrder,
        NewAddress,
        NewOrder,
        NewProduct,
        NewStore,
        NewUser,
        Order,
        OrderId,
        OrderStatus,
        OrderSummary,
        User,
    },
    traits::{StoreError, StorefrontDatabase},
};

const MAX_ATTEMPTS: u32 = 3;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3);
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Runs the retry loop against the primary store. Evaluates to `Ok(result)` when the primary answered (whether with a
/// success or a logical error), or `Err(reason)` when every attempt failed transiently and the fallback should take
/// over.
macro_rules! primary_attempts {
    ($self:expr, $method:ident($($args:expr),* $(,)?)) => {{
        let mut verdict: Option<Result<_, StoreError>> = None;
        let mut last_err: Option<StoreError> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            // Clone::clone(&x) keeps reference arguments as references, unlike x.clone()
            let call = $self.primary.$method($(Clone::clone(&$args)),*);
            let outcome = match tokio::time::timeout(ATTEMPT_TIMEOUT, call).await {
                Ok(res) => res,
                Err(_) => Err(StoreError::Timeout(format!(
                    "{} did not complete within {ATTEMPT_TIMEOUT:?}",
                    stringify!($method)
                ))),
            };
            match outcome {
                Ok(v) => {
                    if attempt > 1 {
                        info!("🛟️ {} succeeded on attempt {attempt}", stringify!($method));
                    }
                    verdict = Some(Ok(v));
                    break;
                },
                Err(e) if e.is_transient() => {
                    warn!("🛟️ Attempt {attempt}/{MAX_ATTEMPTS} of {} failed: {e}", stringify!($method));
                    last_err = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    }
                },
                Err(e) => {
                    verdict = Some(Err(e));
                    break;
                },
            }
        }
        match verdict {
            Some(result) => Ok(result),
            None => {
                let reason = last_err.map(|e| e.to_string()).unwrap_or_else(|| "unknown failure".to_string());
                Err(reason)
            },
        }
    }};
}

/// The common case: retry against the primary, then replay the same call against the fallback.
macro_rules! with_fallback {
    ($self:expr, $method:ident($($args:expr),* $(,)?)) => {
        match primary_attempts!($self, $method($($args),*)) {
            Ok(result) => result,
            Err(reason) => {
                warn!("🛟️ Primary store unavailable for {} ({reason}). Using the fallback store.", stringify!($method));
                $self.fallback.$method($($args),*).await
            },
        }
    };
}

#[derive(Clone)]
pub struct PersistenceFacade<P, F>
where
    P: StorefrontDatabase,
    F: StorefrontDatabase,
{
    primary: P,
    fallback: F,
}

impl<P, F> PersistenceFacade<P, F>
where
    P: StorefrontDatabase,
    F: StorefrontDatabase,
{
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }
}

impl<P, F> StorefrontDatabase for PersistenceFacade<P, F>
where
    P: StorefrontDatabase + Send + Sync,
    F: StorefrontDatabase + Send + Sync,
{
    async fn upsert_user(&self, user: NewUser) -> Result<User, StoreError> {
        with_fallback!(self, upsert_user(user))
    }

    async fn create_address(&self, user_id: &str, address: NewAddress) -> Result<Address, StoreError> {
        with_fallback!(self, create_address(user_id, address))
    }

    async fn upsert_store(&self, store: NewStore) -> Result<(), StoreError> {
        with_fallback!(self, upsert_store(store))
    }

    async fn upsert_product(&self, product: NewProduct) -> Result<(), StoreError> {
        with_fallback!(self, upsert_product(product))
    }

    /// Orders that land in the fallback tier are tagged so they can be found and replayed later.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        match primary_attempts!(self, insert_order(order.clone())) {
            Ok(result) => result,
            Err(reason) => {
                warn!("🛟️ Primary store unavailable for insert_order ({reason}). Capturing order in the fallback store.");
                let mut order = order;
                order.via_fallback = true;
                order.fallback_reason = Some(reason);
                self.fallback.insert_order(order).await
            },
        }
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<FullOrder>, StoreError> {
        with_fallback!(self, fetch_order(order_id))
    }

    async fn fetch_order_by_provider_order_id(&self, provider_order_id: &str) -> Result<Option<Order>, StoreError> {
        with_fallback!(self, fetch_order_by_provider_order_id(provider_order_id))
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<FullOrder>, StoreError> {
        with_fallback!(self, search_orders(query))
    }

    async fn stale_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        with_fallback!(self, stale_pending_orders(now))
    }

    async fn order_summary(&self, store_id: Option<&str>) -> Result<OrderSummary, StoreError> {
        with_fallback!(self, order_summary(store_id))
    }

    async fn set_provider_order_id(&self, order_id: &OrderId, provider_order_id: &str) -> Result<Order, StoreError> {
        with_fallback!(self, set_provider_order_id(order_id, provider_order_id))
    }

    async fn mark_placed_if_pending(
        &self,
        order_id: &OrderId,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CasOutcome, StoreError> {
        with_fallback!(self, mark_placed_if_pending(order_id, payment_id, now))
    }

    async fn mark_expired_if_pending(&self, order_id: &OrderId) -> Result<CasOutcome, StoreError> {
        with_fallback!(self, mark_expired_if_pending(order_id))
    }

    async fn mark_failed_if_pending(&self, order_id: &OrderId, reason: &str) -> Result<CasOutcome, StoreError> {
        with_fallback!(self, mark_failed_if_pending(order_id, reason))
    }

    async fn update_status_if(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<CasOutcome, StoreError> {
        with_fallback!(self, update_status_if(order_id, from, to))
    }

    async fn record_refund(&self, order_id: &OrderId, refund_id: Option<&str>) -> Result<CasOutcome, StoreError> {
        with_fallback!(self, record_refund(order_id, refund_id))
    }

    async fn fetch_setting(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        with_fallback!(self, fetch_setting(key))
    }

    async fn upsert_setting(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        with_fallback!(self, upsert_setting(key, value))
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.primary.close().await?;
        self.fallback.close().await
    }
}

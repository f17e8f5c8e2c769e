//! Shared scaffolding for the engine integration tests.
#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
    Mutex,
};

use chrono::{DateTime, Utc};
use spg_common::MinorUnits;
use storefront_engine::{
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
    order_objects::{CheckoutItem, NewCheckout, OrderQueryFilter},
    traits::{GatewayError, PaymentGateway, StoreError, StorefrontDatabase},
    SqliteDatabase,
};
use tempfile::TempDir;

/// A file-backed SQLite database in a fresh temp directory. Keep the `TempDir` alive for the duration of the test.
pub async fn test_db(dir: &TempDir) -> SqliteDatabase {
    let path = dir.path().join("orders.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    SqliteDatabase::new_with_url(&url, 5).await.expect("could not create test database")
}

pub fn checkout_item(store: &str, price: i64, qty: i64) -> CheckoutItem {
    CheckoutItem {
        product_id: format!("prod-{store}"),
        store_id: store.to_string(),
        name: format!("Product from {store}"),
        image: None,
        quantity: qty,
        unit_price: MinorUnits::from(price),
    }
}

pub fn gateway_checkout(items: Vec<CheckoutItem>) -> NewCheckout {
    NewCheckout {
        user_id: Some("user-1".to_string()),
        user_name: Some("Test User".to_string()),
        address: NewAddress {
            name: "Test User".into(),
            email: "user@example.com".into(),
            street: "1 High St".into(),
            city: "Pune".into(),
            state: "MH".into(),
            zip: "411001".into(),
            country: "IN".into(),
            phone: "+911234567890".into(),
        },
        items,
        total: None,
        payment_method: storefront_engine::db_types::PaymentMethod::Gateway,
        coupon_used: false,
    }
}

//-------------------------------------       TestGateway       ------------------------------------------------------

#[derive(Debug, Default)]
pub struct GatewayLog {
    pub intents: Vec<(i64, String, String)>,
    pub refunds: Vec<String>,
}

/// An in-memory payment gateway that records every call and can be told how to answer refunds.
#[derive(Clone, Default)]
pub struct TestGateway {
    log: Arc<Mutex<GatewayLog>>,
    refund_error: Arc<Mutex<Option<GatewayError>>>,
    refund_delay: Option<std::time::Duration>,
}

impl TestGateway {
    pub fn failing_refunds(error: GatewayError) -> Self {
        let gw = Self::default();
        *gw.refund_error.lock().unwrap() = Some(error);
        gw
    }

    /// Holds every refund call open for `delay`, to widen race windows in concurrency tests.
    pub fn with_refund_delay(mut self, delay: std::time::Duration) -> Self {
        self.refund_delay = Some(delay);
        self
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, GatewayLog> {
        self.log.lock().unwrap()
    }
}

impl PaymentGateway for TestGateway {
    async fn create_intent(
        &self,
        amount: MinorUnits,
        currency: &str,
        reference: &str,
    ) -> Result<String, GatewayError> {
        let mut log = self.log.lock().unwrap();
        log.intents.push((amount.value(), currency.to_string(), reference.to_string()));
        Ok(format!("porder_{}", log.intents.len()))
    }

    async fn refund(&self, payment_id: &str) -> Result<String, GatewayError> {
        if let Some(delay) = self.refund_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.refund_error.lock().unwrap().clone() {
            return Err(err);
        }
        let mut log = self.log.lock().unwrap();
        log.refunds.push(payment_id.to_string());
        Ok(format!("rfnd_{}", log.refunds.len()))
    }
}

//-------------------------------------        FlakyStore       ------------------------------------------------------

/// Wraps a real backend and fails the next `n` calls with a transient error, to exercise the facade's retry and
/// fallback policy.
#[derive(Clone)]
pub struct FlakyStore<B: StorefrontDatabase> {
    inner: B,
    failures_remaining: Arc<AtomicU32>,
}

impl<B: StorefrontDatabase> FlakyStore<B> {
    pub fn new(inner: B, failures: u32) -> Self {
        Self { inner, failures_remaining: Arc::new(AtomicU32::new(failures)) }
    }

    pub fn always_failing(inner: B) -> Self {
        Self::new(inner, u32::MAX)
    }

    fn gate(&self) -> Result<(), StoreError> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            }
            Err(StoreError::DatabaseError("injected outage".to_string()))
        } else {
            Ok(())
        }
    }
}

impl<B: StorefrontDatabase> StorefrontDatabase for FlakyStore<B> {
    async fn upsert_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.gate()?;
        self.inner.upsert_user(user).await
    }

    async fn create_address(&self, user_id: &str, address: NewAddress) -> Result<Address, StoreError> {
        self.gate()?;
        self.inner.create_address(user_id, address).await
    }

    async fn upsert_store(&self, store: NewStore) -> Result<(), StoreError> {
        self.gate()?;
        self.inner.upsert_store(store).await
    }

    async fn upsert_product(&self, product: NewProduct) -> Result<(), StoreError> {
        self.gate()?;
        self.inner.upsert_product(product).await
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        self.gate()?;
        self.inner.insert_order(order).await
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<FullOrder>, StoreError> {
        self.gate()?;
        self.inner.fetch_order(order_id).await
    }

    async fn fetch_order_by_provider_order_id(&self, provider_order_id: &str) -> Result<Option<Order>, StoreError> {
        self.gate()?;
        self.inner.fetch_order_by_provider_order_id(provider_order_id).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<FullOrder>, StoreError> {
        self.gate()?;
        self.inner.search_orders(query).await
    }

    async fn stale_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        self.gate()?;
        self.inner.stale_pending_orders(now).await
    }

    async fn order_summary(&self, store_id: Option<&str>) -> Result<OrderSummary, StoreError> {
        self.gate()?;
        self.inner.order_summary(store_id).await
    }

    async fn set_provider_order_id(&self, order_id: &OrderId, provider_order_id: &str) -> Result<Order, StoreError> {
        self.gate()?;
        self.inner.set_provider_order_id(order_id, provider_order_id).await
    }

    async fn mark_placed_if_pending(
        &self,
        order_id: &OrderId,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CasOutcome, StoreError> {
        self.gate()?;
        self.inner.mark_placed_if_pending(order_id, payment_id, now).await
    }

    async fn mark_expired_if_pending(&self, order_id: &OrderId) -> Result<CasOutcome, StoreError> {
        self.gate()?;
        self.inner.mark_expired_if_pending(order_id).await
    }

    async fn mark_failed_if_pending(&self, order_id: &OrderId, reason: &str) -> Result<CasOutcome, StoreError> {
        self.gate()?;
        self.inner.mark_failed_if_pending(order_id, reason).await
    }

    async fn update_status_if(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<CasOutcome, StoreError> {
        self.gate()?;
        self.inner.update_status_if(order_id, from, to).await
    }

    async fn record_refund(&self, order_id: &OrderId, refund_id: Option<&str>) -> Result<CasOutcome, StoreError> {
        self.gate()?;
        self.inner.record_refund(order_id, refund_id).await
    }

    async fn fetch_setting(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.gate()?;
        self.inner.fetch_setting(key).await
    }

    async fn upsert_setting(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        self.gate()?;
        self.inner.upsert_setting(key, value).await
    }
}

use chrono::{DateTime, Utc};
use thiserror::Error;

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
};

/// The persistence contract for the storefront payment engine.
///
/// Three implementations exist:
/// * [`crate::SqliteDatabase`] — the primary transactional store,
/// * [`crate::FileStoreBackend`] — the file-backed fallback store,
/// * [`crate::PersistenceFacade`] — the retry-then-fallback composition of the two, which is what the rest of the
///   system talks to.
///
/// The status mutations are all expressed as guarded, compare-and-swap updates. The order document is the unit of
/// mutual exclusion: the guard makes the synchronous-confirm / webhook / reaper race safe without a distributed lock.
#[allow(async_fn_in_trait)]
pub trait StorefrontDatabase: Clone {
    /// Creates the user if it does not exist, or refreshes its name if it does.
    async fn upsert_user(&self, user: NewUser) -> Result<User, StoreError>;

    /// Creates a new address record for the given user. Addresses are per-order and never shared.
    async fn create_address(&self, user_id: &str, address: NewAddress) -> Result<Address, StoreError>;

    /// Creates the store if it does not exist. Existing stores are left untouched.
    async fn upsert_store(&self, store: NewStore) -> Result<(), StoreError>;

    /// Creates the product if it does not exist. Existing products are left untouched.
    async fn upsert_product(&self, product: NewProduct) -> Result<(), StoreError>;

    /// Stores the order and its line-item snapshots in a single atomic write.
    /// Fails with [`StoreError::OrderAlreadyExists`] if the order id is taken.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError>;

    /// Fetches an order with its line items and address, or `None` if it does not exist.
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<FullOrder>, StoreError>;

    /// Fetches the order that was handed to the payment provider under the given provider-side order reference.
    async fn fetch_order_by_provider_order_id(&self, provider_order_id: &str) -> Result<Option<Order>, StoreError>;

    /// Fetches orders matching the filter, ordered by creation time, newest first.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<FullOrder>, StoreError>;

    /// All `Pending` orders whose payment window elapsed at or before `now`.
    async fn stale_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError>;

    /// Aggregate order count and revenue, optionally restricted to one store.
    async fn order_summary(&self, store_id: Option<&str>) -> Result<OrderSummary, StoreError>;

    /// Stamps the provider-side order reference onto the order.
    async fn set_provider_order_id(&self, order_id: &OrderId, provider_order_id: &str) -> Result<Order, StoreError>;

    /// Guard: status is `Pending` and the payment window has not elapsed at `now`.
    /// Effect: status becomes `Placed` and the payment id is stamped.
    async fn mark_placed_if_pending(
        &self,
        order_id: &OrderId,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CasOutcome, StoreError>;

    /// Guard: status is `Pending`. Effect: status becomes `Expired`.
    async fn mark_expired_if_pending(&self, order_id: &OrderId) -> Result<CasOutcome, StoreError>;

    /// Guard: status is `Pending`. Effect: status becomes `Failed` and the failure reason is recorded.
    async fn mark_failed_if_pending(&self, order_id: &OrderId, reason: &str) -> Result<CasOutcome, StoreError>;

    /// Guard: current status equals `from`. Effect: status becomes `to`.
    async fn update_status_if(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<CasOutcome, StoreError>;

    /// Records the refund obligation and its outcome, at most once per order.
    ///
    /// `None` claims the refund: the guard is that no refund id is recorded and no claim is outstanding, and the
    /// effect is to set `refund_pending`. Callers claim before talking to the gateway, so racing reconciliations
    /// issue at most one refund. `Some(refund_id)` settles a claim: the guard is only that no refund id is recorded
    /// yet, and the effect is to stamp the id and clear `refund_pending`.
    async fn record_refund(&self, order_id: &OrderId, refund_id: Option<&str>) -> Result<CasOutcome, StoreError>;

    /// Reads a settings value by key.
    async fn fetch_setting(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Writes a settings value by key, replacing any previous value.
    async fn upsert_setting(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError>;

    /// Closes the backend. The default implementation does nothing.
    async fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The primary backend failed for infrastructure reasons. Retryable.
    #[error("Backend failure: {0}")]
    DatabaseError(String),
    /// A backend call exceeded its deadline. Retryable.
    #[error("Backend call timed out: {0}")]
    Timeout(String),
    /// The fallback tier failed too. There is no third tier; this is fatal for the operation.
    #[error("Fallback store failure: {0}")]
    FallbackError(String),
    #[error("Cannot insert order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Could not serialize record: {0}")]
    SerializationError(String),
}

impl StoreError {
    /// Whether the retry-then-fallback policy applies. Logical errors (duplicates, misses) never do.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::DatabaseError(_) | StoreError::Timeout(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::SerializationError(e.to_string())
    }
}

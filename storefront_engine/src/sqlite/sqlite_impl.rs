//! `SqliteDatabase` is the primary storefront persistence backend.
//!
//! Unsurprisingly, it uses SQLite, and implements [`StorefrontDatabase`] directly. In production it sits behind
//! [`crate::PersistenceFacade`], which adds the retry-then-fallback policy on top.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{create_schema, db_url, new_pool, orders, products, settings, users};
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

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects using the `SPG_DATABASE_URL` environment variable (or the default path) and ensures the schema.
    pub async fn new(max_connections: u32) -> Result<Self, StoreError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = new_pool(url, max_connections).await?;
        create_schema(&pool).await?;
        debug!("🗃️ Connected to database at {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn full_order(&self, order: Order) -> Result<FullOrder, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_line_items(&order.order_id, &mut conn).await?;
        let address = match order.address_id.as_deref() {
            Some(id) => users::fetch_address(id, &mut conn).await?,
            None => None,
        };
        Ok(FullOrder { order, items, address })
    }
}

impl StorefrontDatabase for SqliteDatabase {
    async fn upsert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let user = users::upsert_user(user, &mut conn).await?;
        trace!("🗃️ User {} upserted", user.id);
        Ok(user)
    }

    async fn create_address(&self, user_id: &str, address: NewAddress) -> Result<Address, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let address = users::insert_address(user_id, address, &mut conn).await?;
        Ok(address)
    }

    async fn upsert_store(&self, store: NewStore) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        products::upsert_store(store, &mut conn).await?;
        Ok(())
    }

    async fn upsert_product(&self, product: NewProduct) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        products::upsert_product(product, &mut conn).await?;
        Ok(())
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let inserted = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} has been saved with id {}", inserted.order_id, inserted.id);
        Ok(inserted)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<FullOrder>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        drop(conn);
        match order {
            Some(order) => Ok(Some(self.full_order(order).await?)),
            None => Ok(None),
        }
    }

    async fn fetch_order_by_provider_order_id(&self, provider_order_id: &str) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_provider_order_id(provider_order_id, &mut conn).await?;
        Ok(order)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<FullOrder>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let flat = orders::search_orders(query, &mut conn).await?;
        drop(conn);
        let mut result = Vec::with_capacity(flat.len());
        for order in flat {
            result.push(self.full_order(order).await?);
        }
        Ok(result)
    }

    async fn stale_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let stale = orders::stale_pending_orders(now, &mut conn).await?;
        Ok(stale)
    }

    async fn order_summary(&self, store_id: Option<&str>) -> Result<OrderSummary, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let (total_orders, total_amount, cancelled) = orders::order_summary(store_id, &mut conn).await?;
        Ok(OrderSummary { total_orders, total_amount: total_amount.into(), cancelled })
    }

    async fn set_provider_order_id(&self, order_id: &OrderId, provider_order_id: &str) -> Result<Order, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::set_provider_order_id(order_id, provider_order_id, &mut conn).await
    }

    async fn mark_placed_if_pending(
        &self,
        order_id: &OrderId,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CasOutcome, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::mark_placed_if_pending(order_id, payment_id, now, &mut conn).await
    }

    async fn mark_expired_if_pending(&self, order_id: &OrderId) -> Result<CasOutcome, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::mark_expired_if_pending(order_id, &mut conn).await
    }

    async fn mark_failed_if_pending(&self, order_id: &OrderId, reason: &str) -> Result<CasOutcome, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::mark_failed_if_pending(order_id, reason, &mut conn).await
    }

    async fn update_status_if(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<CasOutcome, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_status_if(order_id, from, to, &mut conn).await
    }

    async fn record_refund(&self, order_id: &OrderId, refund_id: Option<&str>) -> Result<CasOutcome, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::record_refund(order_id, refund_id, &mut conn).await
    }

    async fn fetch_setting(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        settings::fetch_setting(key, &mut conn).await
    }

    async fn upsert_setting(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        settings::upsert_setting(key, value, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}

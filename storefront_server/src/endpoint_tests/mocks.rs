use chrono::{DateTime, Utc};
use mockall::mock;
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
    order_objects::OrderQueryFilter,
    traits::{GatewayError, PaymentGateway, StoreError, StorefrontDatabase},
};

mock! {
    pub Backend {}

    impl Clone for Backend {
        fn clone(&self) -> Self;
    }

    impl StorefrontDatabase for Backend {
        async fn upsert_user(&self, user: NewUser) -> Result<User, StoreError>;
        async fn create_address(&self, user_id: &str, address: NewAddress) -> Result<Address, StoreError>;
        async fn upsert_store(&self, store: NewStore) -> Result<(), StoreError>;
        async fn upsert_product(&self, product: NewProduct) -> Result<(), StoreError>;
        async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError>;
        async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<FullOrder>, StoreError>;
        async fn fetch_order_by_provider_order_id(&self, provider_order_id: &str) -> Result<Option<Order>, StoreError>;
        async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<FullOrder>, StoreError>;
        async fn stale_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError>;
        async fn order_summary<'a>(&self, store_id: Option<&'a str>) -> Result<OrderSummary, StoreError>;
        async fn set_provider_order_id(&self, order_id: &OrderId, provider_order_id: &str) -> Result<Order, StoreError>;
        async fn mark_placed_if_pending(&self, order_id: &OrderId, payment_id: &str, now: DateTime<Utc>) -> Result<CasOutcome, StoreError>;
        async fn mark_expired_if_pending(&self, order_id: &OrderId) -> Result<CasOutcome, StoreError>;
        async fn mark_failed_if_pending(&self, order_id: &OrderId, reason: &str) -> Result<CasOutcome, StoreError>;
        async fn update_status_if(&self, order_id: &OrderId, from: OrderStatus, to: OrderStatus) -> Result<CasOutcome, StoreError>;
        async fn record_refund<'a>(&self, order_id: &OrderId, refund_id: Option<&'a str>) -> Result<CasOutcome, StoreError>;
        async fn fetch_setting(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;
        async fn upsert_setting(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError>;
        async fn close(&mut self) -> Result<(), StoreError>;
    }
}

mock! {
    pub Gateway {}

    impl Clone for Gateway {
        fn clone(&self) -> Self;
    }

    impl PaymentGateway for Gateway {
        async fn create_intent(&self, amount: MinorUnits, currency: &str, reference: &str) -> Result<String, GatewayError>;
        async fn refund(&self, payment_id: &str) -> Result<String, GatewayError>;
    }
}

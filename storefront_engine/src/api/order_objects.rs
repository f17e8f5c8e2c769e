use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spg_common::MinorUnits;

use crate::db_types::{NewAddress, OrderStatus, PaymentMethod};

/// Filter for order searches. Every field is optional; an empty filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub user_id: Option<String>,
    pub store_id: Option<String>,
    pub status: Option<OrderStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl OrderQueryFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self { user_id: Some(user_id.into()), ..Default::default() }
    }

    pub fn for_store(store_id: impl Into<String>) -> Self {
        Self { store_id: Some(store_id.into()), ..Default::default() }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
            && self.store_id.is_none()
            && self.status.is_none()
            && self.since.is_none()
            && self.until.is_none()
            && self.limit.is_none()
    }
}

/// One cart line as submitted at checkout. Prices are snapshotted at this point and never re-read from the catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: String,
    pub store_id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub quantity: i64,
    pub unit_price: MinorUnits,
}

impl CheckoutItem {
    pub fn line_total(&self) -> MinorUnits {
        self.unit_price * self.quantity
    }
}

/// A checkout request as it arrives from the storefront.
///
/// `user_id` is `None` for guest checkouts; a guest account is minted for them during processing. The optional
/// `total` is the amount the storefront displayed to the buyer; when present it is cross-checked against the line
/// totals, and the order is what the line items say, never what the client claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCheckout {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub address: NewAddress,
    pub items: Vec<CheckoutItem>,
    #[serde(default)]
    pub total: Option<MinorUnits>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub coupon_used: bool,
}

impl NewCheckout {
    pub fn items_total(&self) -> MinorUnits {
        self.items.iter().map(CheckoutItem::line_total).sum()
    }
}

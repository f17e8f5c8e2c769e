use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use spg_common::MinorUnits;
use sqlx::{FromRow, Type};
use thiserror::Error;

use crate::helpers::random_id;

//--------------------------------------        OrderId        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn random() -> Self {
        Self(random_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------      OrderStatus      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    /// The order has been created and is waiting for the payment window to resolve.
    Pending,
    /// Payment has been captured (or the order is collect-on-delivery) and the order is with the seller.
    Placed,
    /// The seller has handed the order to the courier.
    Shipped,
    /// The buyer has received the order.
    Delivered,
    /// The order was cancelled by the buyer or the seller.
    Cancelled,
    /// The payment window elapsed before payment was confirmed.
    Expired,
    /// The payment provider reported a definitive payment failure.
    Failed,
}

impl OrderStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Expired | OrderStatus::Failed)
    }

    /// The forward transitions a seller or admin may request via `set_status`.
    pub fn can_progress_to(&self, new: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!((self, new), (Pending, Cancelled) | (Placed, Shipped) | (Placed, Cancelled) | (Shipped, Delivered))
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Placed => "Placed",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Expired => "Expired",
            OrderStatus::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Placed" => Ok(Self::Placed),
            "Shipped" => Ok(Self::Shipped),
            "Delivered" => Ok(Self::Delivered),
            "Cancelled" => Ok(Self::Cancelled),
            "Expired" => Ok(Self::Expired),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError(s.to_string())),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatus::Pending
        })
    }
}

//--------------------------------------     PaymentMethod     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Payment is collected up front through the hosted payment provider.
    Gateway,
    /// Collect on delivery. No payment window applies.
    Cod,
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Gateway => write!(f, "Gateway"),
            PaymentMethod::Cod => write!(f, "Cod"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gateway" | "razorpay" | "online" => Ok(Self::Gateway),
            "cod" => Ok(Self::Cod),
            s => Err(ConversionError(format!("Invalid payment method: {s}"))),
        }
    }
}

//--------------------------------------        Order          -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub user_id: String,
    /// The store of the first line item. Orders spanning several sellers keep per-item store ids on the line items.
    pub store_id: String,
    pub address_id: Option<String>,
    pub total_price: MinorUnits,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    /// The provider-side order reference, stamped when a payment intent is created.
    pub provider_order_id: Option<String>,
    /// The provider-side payment id, stamped when payment is captured.
    pub payment_id: Option<String>,
    pub refund_id: Option<String>,
    /// Set when a refund was owed but the refund call failed. Flags the order for manual reconciliation.
    pub refund_pending: bool,
    pub failure_reason: Option<String>,
    pub coupon_used: bool,
    /// True if the record was written through the file fallback while the primary store was down.
    pub via_fallback: bool,
    pub fallback_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// End of the payment window. Only meaningful while the status is `Pending`.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Pending && self.expires_at.map(|t| t <= now).unwrap_or(false)
    }

    pub fn is_paid(&self) -> bool {
        self.payment_id.is_some()
    }
}

//--------------------------------------       LineItem        -------------------------------------------------------
/// A frozen snapshot of a product at order time, owned by its order. Catalog edits after checkout never alter it.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct LineItem {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: String,
    pub store_id: String,
    pub name: String,
    pub image: String,
    pub quantity: i64,
    pub unit_price: MinorUnits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub product_id: String,
    pub store_id: String,
    pub name: String,
    pub image: String,
    pub quantity: i64,
    pub unit_price: MinorUnits,
}

impl NewLineItem {
    pub fn line_total(&self) -> MinorUnits {
        self.unit_price * self.quantity
    }
}

//--------------------------------------       NewOrder        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub user_id: String,
    pub store_id: String,
    pub address_id: Option<String>,
    pub total_price: MinorUnits,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub coupon_used: bool,
    pub via_fallback: bool,
    pub fallback_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub items: Vec<NewLineItem>,
}

impl NewOrder {
    pub fn new(user_id: String, store_id: String, items: Vec<NewLineItem>) -> Self {
        let total_price = items.iter().map(NewLineItem::line_total).sum();
        Self {
            order_id: OrderId::random(),
            user_id,
            store_id,
            address_id: None,
            total_price,
            currency: spg_common::DEFAULT_CURRENCY.to_string(),
            status: OrderStatus::Pending,
            payment_method: PaymentMethod::Gateway,
            coupon_used: false,
            via_fallback: false,
            fallback_reason: None,
            created_at: Utc::now(),
            expires_at: None,
            items,
        }
    }

    pub fn total_from_items(&self) -> MinorUnits {
        self.items.iter().map(NewLineItem::line_total).sum()
    }
}

//--------------------------------------       FullOrder       -------------------------------------------------------
///// The read shape for an order: the flat record plus its line-item snapshots and shipping address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullOrder {
    pub order: Order,
    pub items: Vec<LineItem>,
    pub address: Option<Address>,
}

//--------------------------------------         User          -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl NewUser {
    /// A minimal guest identity, enough to satisfy the persistence layer's referential needs without registration.
    pub fn guest() -> Self {
        let id = format!("guest-{}", random_id());
        Self { name: format!("User {id}"), email: format!("{id}@example.com"), id }
    }

    pub fn minimal(id: &str) -> Self {
        Self { id: id.to_string(), name: format!("User {id}"), email: format!("{id}@example.com") }
    }
}

//--------------------------------------        Address        -------------------------------------------------------
/// One address record is created per order; addresses are not shared or deduplicated.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Address {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewAddress {
    pub name: String,
    pub email: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub phone: String,
}

//--------------------------------------         Store         -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Store {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStore {
    pub id: String,
    pub owner_id: String,
    pub name: String,
}

impl NewStore {
    pub fn minimal(id: &str, owner_id: &str) -> Self {
        Self { id: id.to_string(), owner_id: owner_id.to_string(), name: format!("Store {id}") }
    }
}

//--------------------------------------        Product        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub store_id: String,
    pub name: String,
    pub description: String,
    pub price: MinorUnits,
    pub image: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub id: String,
    pub store_id: String,
    pub name: String,
    pub description: String,
    pub price: MinorUnits,
    pub image: String,
    pub category: String,
}

impl NewProduct {
    /// The placeholder written when an order references a product the catalog no longer (or never) contained.
    pub fn placeholder(id: &str, store_id: &str, price: MinorUnits) -> Self {
        Self {
            id: id.to_string(),
            store_id: store_id.to_string(),
            name: "Imported product".to_string(),
            description: String::new(),
            price,
            image: String::new(),
            category: "uncategorized".to_string(),
        }
    }
}

//--------------------------------------      OrderSummary     -------------------------------------------------------
/// The aggregate snapshot pushed as the first event on an order subscription. Cancelled orders are excluded from the
/// totals but reported separately.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub total_orders: i64,
    pub total_amount: MinorUnits,
    pub cancelled: i64,
}

//--------------------------------------       CasOutcome      -------------------------------------------------------
/// The result of a guarded (compare-and-swap) status update.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// The guard matched and the update was applied. Holds the updated record.
    Applied(Order),
    /// The guard did not match. Holds the record as it currently stands.
    Unchanged(Order),
}

impl CasOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CasOutcome::Applied(_))
    }

    pub fn order(&self) -> &Order {
        match self {
            CasOutcome::Applied(o) | CasOutcome::Unchanged(o) => o,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            CasOutcome::Applied(o) | CasOutcome::Unchanged(o) => o,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_round_trip() {
        for s in
            [OrderStatus::Pending, OrderStatus::Placed, OrderStatus::Shipped, OrderStatus::Delivered, OrderStatus::Cancelled, OrderStatus::Expired, OrderStatus::Failed]
        {
            assert_eq!(s.to_string().parse::<OrderStatus>().unwrap(), s);
        }
        assert!("Nonsense".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Placed.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
    }

    #[test]
    fn seller_progressions() {
        use OrderStatus::*;
        assert!(Placed.can_progress_to(Shipped));
        assert!(Shipped.can_progress_to(Delivered));
        assert!(Placed.can_progress_to(Cancelled));
        assert!(Pending.can_progress_to(Cancelled));
        assert!(!Delivered.can_progress_to(Cancelled));
        assert!(!Expired.can_progress_to(Placed));
        assert!(!Pending.can_progress_to(Shipped));
    }

    #[test]
    fn new_order_totals() {
        let items = vec![
            NewLineItem {
                product_id: "p1".into(),
                store_id: "s1".into(),
                name: "Widget".into(),
                image: String::new(),
                quantity: 2,
                unit_price: MinorUnits::from(100),
            },
            NewLineItem {
                product_id: "p2".into(),
                store_id: "s1".into(),
                name: "Gadget".into(),
                image: String::new(),
                quantity: 1,
                unit_price: MinorUnits::from(250),
            },
        ];
        let order = NewOrder::new("u1".into(), "s1".into(), items);
        assert_eq!(order.total_price, MinorUnits::from(450));
        assert_eq!(order.total_from_items(), order.total_price);
        assert_eq!(order.status, OrderStatus::Pending);
    }
}

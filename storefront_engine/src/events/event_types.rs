use serde::{Deserialize, Serialize};

use crate::db_types::{FullOrder, Order, OrderStatus};

/// Fired when a new order lands in the store, whichever tier it was written to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order: FullOrder,
}

impl OrderCreatedEvent {
    pub fn new(order: FullOrder) -> Self {
        Self { order }
    }
}

/// Fired when an order's status changes, carrying both sides of the transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderChangedEvent {
    pub order: Order,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
}

impl OrderChangedEvent {
    pub fn new(order: Order, old_status: OrderStatus) -> Self {
        let new_status = order.status;
        Self { order, old_status, new_status }
    }
}

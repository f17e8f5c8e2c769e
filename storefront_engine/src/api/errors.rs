use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderStatus},
    traits::{GatewayError, StoreError},
};

#[derive(Debug, Error)]
pub enum OrderFlowError {
    #[error(transparent)]
    StoreError(#[from] StoreError),
    #[error(transparent)]
    GatewayError(#[from] GatewayError),
    #[error("Cannot check out an empty cart")]
    EmptyCart,
    #[error("Order amounts must be positive. Got {0} minor units")]
    InvalidAmount(i64),
    #[error("Line item quantities must be positive. Got {0}")]
    InvalidQuantity(i64),
    #[error("The supplied total of {supplied} minor units does not match the cart total of {computed}")]
    TotalMismatch { supplied: i64, computed: i64 },
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {order_id} is not payable through the gateway (status {status}, method {method})")]
    NotPayable { order_id: OrderId, status: OrderStatus, method: String },
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidStatusTransition { order_id: OrderId, from: OrderStatus, to: OrderStatus },
}

use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId};

/// The result of one reaper sweep over stale pending orders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpiryResult {
    /// Orders this sweep moved from `Pending` to `Expired`.
    pub expired: Vec<OrderId>,
    /// Orders that were stale when scanned, but which another actor settled before we could expire them.
    pub already_settled: Vec<OrderId>,
}

impl ExpiryResult {
    pub fn total_scanned(&self) -> usize {
        self.expired.len() + self.already_settled.len()
    }
}

/// The outcome of confirming a captured payment against an order.
///
/// The variants mirror the ways the confirm / webhook / reaper race can land, and every one of them is a
/// *successful* reconciliation — only signature failures and storage errors are errors.
#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    /// We won the race. The order moved from `Pending` to `Placed`.
    Placed(Order),
    /// Another confirmation path got there first. Nothing left to do.
    AlreadyPlaced(Order),
    /// The order expired before the capture arrived. A refund was attempted for the captured payment.
    Expired {
        order: Order,
        /// The provider-side refund id, or `None` if the refund attempt failed and is flagged for manual follow-up.
        refund_id: Option<String>,
    },
    /// The order was cancelled or failed before the capture arrived. The stray capture is refunded, but the
    /// confirmation itself conflicts with the order's terminal state.
    Unfulfillable {
        order: Order,
        /// The provider-side refund id, or `None` if the refund attempt failed and is flagged for manual follow-up.
        refund_id: Option<String>,
    },
}

impl ConfirmOutcome {
    pub fn order(&self) -> &Order {
        match self {
            ConfirmOutcome::Placed(o) | ConfirmOutcome::AlreadyPlaced(o) => o,
            ConfirmOutcome::Expired { order, .. } | ConfirmOutcome::Unfulfillable { order, .. } => order,
        }
    }
}

/// What a webhook reconciliation did, if anything.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// A capture event was settled against an order.
    Settled(ConfirmOutcome),
    /// A failure event moved the order to `Failed`.
    Failed(Order),
    /// The event was acknowledged without touching any order: an untracked event type, an unknown provider order, or
    /// a replay against an already-settled order.
    Ignored,
}

/// A payment notification extracted from a provider webhook envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    /// The provider captured the payment.
    Captured { provider_order_id: String, payment_id: String },
    /// The payment attempt failed terminally on the provider side.
    Failed { provider_order_id: String, payment_id: String, reason: String },
    /// An event type we do not reconcile. Acknowledged and ignored.
    Other { event: String },
}

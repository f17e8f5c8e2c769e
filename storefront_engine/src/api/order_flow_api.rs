use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    api::{
        errors::OrderFlowError,
        order_objects::{NewCheckout, OrderQueryFilter},
    },
    db_types::{
        CasOutcome,
        FullOrder,
        NewOrder,
        NewProduct,
        NewStore,
        NewUser,
        Order,
        OrderId,
        OrderStatus,
        OrderSummary,
        PaymentMethod,
    },
    events::{EventProducers, OrderChangedEvent, OrderCreatedEvent},
    traits::{
        ConfirmOutcome,
        ExpiryResult,
        GatewayError,
        PaymentEvent,
        PaymentGateway,
        ReconcileOutcome,
        StoreError,
        StorefrontDatabase,
    },
};

pub const DEFAULT_PAYMENT_WINDOW_MINUTES: i64 = 10;

/// `OrderFlowApi` drives the order lifecycle from checkout to settlement.
///
/// It owns the state machine rules and the reconciliation race: the synchronous payment callback, the asynchronous
/// webhook and the expiry reaper all funnel through the guarded status updates of the backend, so whichever actor
/// lands first wins and the others observe the settled state instead of clobbering it.
#[derive(Clone)]
pub struct OrderFlowApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
    payment_window: Duration,
}

impl<B, G> Debug for OrderFlowApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B, G> OrderFlowApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers, payment_window: Duration::minutes(DEFAULT_PAYMENT_WINDOW_MINUTES) }
    }

    pub fn with_payment_window(mut self, window: Duration) -> Self {
        self.payment_window = window;
        self
    }

    pub fn payment_window(&self) -> Duration {
        self.payment_window
    }
}

impl<B, G> OrderFlowApi<B, G>
where
    B: StorefrontDatabase,
    G: PaymentGateway,
{
    /// Accepts a checkout and records the order.
    ///
    /// Gateway orders open a payment window and start life as `Pending`; collect-on-delivery orders have nothing to
    /// wait for and are `Placed` immediately. Users, stores and products referenced by the cart are created on the
    /// fly if the catalogue has never seen them, since line items carry their own snapshots anyway.
    pub async fn process_checkout(&self, checkout: NewCheckout) -> Result<FullOrder, OrderFlowError> {
        if checkout.items.is_empty() {
            return Err(OrderFlowError::EmptyCart);
        }
        if let Some(item) = checkout.items.iter().find(|i| i.quantity <= 0) {
            return Err(OrderFlowError::InvalidQuantity(item.quantity));
        }
        let total = checkout.items_total();
        if !total.is_positive() {
            return Err(OrderFlowError::InvalidAmount(total.value()));
        }
        // a client-supplied total is cross-checked, never trusted
        if let Some(supplied) = checkout.total {
            if supplied != total {
                return Err(OrderFlowError::TotalMismatch { supplied: supplied.value(), computed: total.value() });
            }
        }

        let user = match &checkout.user_id {
            Some(id) => {
                let mut new_user = NewUser::minimal(id);
                if let Some(name) = &checkout.user_name {
                    new_user.name = name.clone();
                }
                self.db.upsert_user(new_user).await?
            },
            None => self.db.upsert_user(NewUser::guest()).await?,
        };
        let address = self.db.create_address(&user.id, checkout.address.clone()).await?;
        for item in &checkout.items {
            self.db.upsert_store(NewStore::minimal(&item.store_id, &user.id)).await?;
            self.db
                .upsert_product(NewProduct::placeholder(&item.product_id, &item.store_id, item.unit_price))
                .await?;
        }

        let mut order = NewOrder::new(
            user.id.clone(),
            checkout.items[0].store_id.clone(),
            checkout
                .items
                .iter()
                .map(|i| crate::db_types::NewLineItem {
                    product_id: i.product_id.clone(),
                    store_id: i.store_id.clone(),
                    name: i.name.clone(),
                    image: i.image.clone().unwrap_or_default(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                })
                .collect(),
        );
        order.address_id = Some(address.id);
        order.payment_method = checkout.payment_method;
        order.coupon_used = checkout.coupon_used;
        match checkout.payment_method {
            PaymentMethod::Gateway => {
                order.status = OrderStatus::Pending;
                order.expires_at = Some(order.created_at + self.payment_window);
            },
            PaymentMethod::Cod => {
                order.status = OrderStatus::Placed;
                order.expires_at = None;
            },
        }

        let inserted = self.db.insert_order(order).await?;
        info!(
            "🛒️ Order {} for {} accepted ({}, {})",
            inserted.order_id, inserted.user_id, inserted.total_price, inserted.payment_method
        );
        let full = self
            .db
            .fetch_order(&inserted.order_id)
            .await?
            .ok_or_else(|| StoreError::OrderNotFound(inserted.order_id.clone()))?;
        self.call_order_created_hook(&full).await;
        Ok(full)
    }

    /// Creates a payment intent with the provider for a pending gateway order, and stamps the provider-side order
    /// reference onto our record for later reconciliation.
    pub async fn create_payment_intent(&self, order_id: &OrderId) -> Result<(Order, String), OrderFlowError> {
        let full = self.db.fetch_order(order_id).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        let order = full.order;
        if order.status != OrderStatus::Pending || order.payment_method != PaymentMethod::Gateway {
            return Err(OrderFlowError::NotPayable {
                order_id: order_id.clone(),
                status: order.status,
                method: order.payment_method.to_string(),
            });
        }
        if !order.total_price.is_positive() {
            return Err(GatewayError::InvalidAmount(order.total_price.value()).into());
        }
        let provider_order_id =
            self.gateway.create_intent(order.total_price, &order.currency, order.order_id.as_str()).await?;
        let order = self.db.set_provider_order_id(order_id, &provider_order_id).await?;
        debug!("💳️ Payment intent {provider_order_id} created for order {order_id}");
        Ok((order, provider_order_id))
    }

    /// Settles a captured payment against the order it belongs to. Callers must have authenticated the notification
    /// (signature checks live in [`crate::helpers`]) before calling this.
    ///
    /// This is the heart of the reconciliation race, and it is idempotent: replays and racing duplicates land on
    /// [`ConfirmOutcome::AlreadyPlaced`]. A capture that arrives after the payment window closed is refunded.
    pub async fn confirm_payment(
        &self,
        provider_order_id: &str,
        payment_id: &str,
    ) -> Result<ConfirmOutcome, OrderFlowError> {
        let order = self
            .db
            .fetch_order_by_provider_order_id(provider_order_id)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(OrderId(provider_order_id.to_string())))?;
        self.settle_capture(order, payment_id).await
    }

    async fn settle_capture(&self, order: Order, payment_id: &str) -> Result<ConfirmOutcome, OrderFlowError> {
        let order_id = order.order_id.clone();
        match self.db.mark_placed_if_pending(&order_id, payment_id, Utc::now()).await? {
            CasOutcome::Applied(placed) => {
                info!("💳️ Payment {payment_id} confirmed. Order {order_id} is placed.");
                self.call_order_changed_hook(&placed, OrderStatus::Pending).await;
                Ok(ConfirmOutcome::Placed(placed))
            },
            CasOutcome::Unchanged(current) => match current.status {
                OrderStatus::Placed | OrderStatus::Shipped | OrderStatus::Delivered => {
                    debug!("💳️ Duplicate confirmation for order {order_id}. Payment {payment_id} already settled.");
                    Ok(ConfirmOutcome::AlreadyPlaced(current))
                },
                OrderStatus::Pending => {
                    // the in-window check failed, so the order is stale; expire it and fall through to the refund
                    let current = match self.db.mark_expired_if_pending(&order_id).await? {
                        CasOutcome::Applied(expired) => {
                            self.call_order_changed_hook(&expired, OrderStatus::Pending).await;
                            expired
                        },
                        CasOutcome::Unchanged(o) => o,
                    };
                    let refund_id = self.refund_captured_payment(&current, payment_id).await?;
                    Ok(ConfirmOutcome::Expired { order: current, refund_id })
                },
                OrderStatus::Expired => {
                    let refund_id = self.refund_captured_payment(&current, payment_id).await?;
                    Ok(ConfirmOutcome::Expired { order: current, refund_id })
                },
                // a capture against a cancelled or failed order is a conflict, but the money still goes back
                OrderStatus::Cancelled | OrderStatus::Failed => {
                    let refund_id = self.refund_captured_payment(&current, payment_id).await?;
                    Ok(ConfirmOutcome::Unfulfillable { order: current, refund_id })
                },
            },
        }
    }

    /// Refunds a payment captured against an order that can no longer be fulfilled.
    ///
    /// The refund obligation is claimed with a guarded write *before* the gateway is called, so when the callback,
    /// the webhook and the reaper all land on the same stray capture, exactly one of them talks to the gateway. The
    /// losers observe whatever the winner has recorded so far. A failed refund call leaves the claim flagged for
    /// manual follow-up instead of erroring the reconciliation.
    async fn refund_captured_payment(
        &self,
        order: &Order,
        payment_id: &str,
    ) -> Result<Option<String>, OrderFlowError> {
        let claimed = match self.db.record_refund(&order.order_id, None).await? {
            CasOutcome::Applied(o) => o,
            CasOutcome::Unchanged(o) => {
                debug!("💳️ Refund for order {} has already been handled", o.order_id);
                return Ok(o.refund_id);
            },
        };
        warn!("💳️ Payment {payment_id} was captured for unfulfillable order {}. Refunding.", claimed.order_id);
        match self.gateway.refund(payment_id).await {
            Ok(refund_id) => {
                self.db.record_refund(&claimed.order_id, Some(&refund_id)).await?;
                info!("💳️ Refund {refund_id} issued for order {}", claimed.order_id);
                Ok(Some(refund_id))
            },
            Err(GatewayError::AlreadyRefunded(_)) => {
                debug!("💳️ Payment {payment_id} was already refunded on the provider side");
                Ok(None)
            },
            Err(e) => {
                error!("💳️ Refund for order {} failed: {e}. The claim stays flagged for follow-up.", claimed.order_id);
                Ok(None)
            },
        }
    }

    /// Reconciles a webhook notification. [`ReconcileOutcome::Ignored`] means the event was acknowledged without
    /// touching any order: an untracked event type, an unknown provider order, or a replay against a settled order.
    pub async fn reconcile_webhook(&self, event: PaymentEvent) -> Result<ReconcileOutcome, OrderFlowError> {
        match event {
            PaymentEvent::Captured { provider_order_id, payment_id } => {
                match self.db.fetch_order_by_provider_order_id(&provider_order_id).await? {
                    Some(order) => {
                        debug!("📨️ Webhook capture for order {} (payment {payment_id})", order.order_id);
                        let outcome = self.settle_capture(order, &payment_id).await?;
                        Ok(ReconcileOutcome::Settled(outcome))
                    },
                    None => {
                        warn!("📨️ Webhook capture for unknown provider order {provider_order_id}. Acknowledged and \
                               dropped.");
                        Ok(ReconcileOutcome::Ignored)
                    },
                }
            },
            PaymentEvent::Failed { provider_order_id, payment_id, reason } => {
                match self.db.fetch_order_by_provider_order_id(&provider_order_id).await? {
                    Some(order) => {
                        match self.db.mark_failed_if_pending(&order.order_id, &reason).await? {
                            CasOutcome::Applied(failed) => {
                                info!("📨️ Payment {payment_id} failed for order {}: {reason}", failed.order_id);
                                self.call_order_changed_hook(&failed, OrderStatus::Pending).await;
                                Ok(ReconcileOutcome::Failed(failed))
                            },
                            CasOutcome::Unchanged(o) => {
                                debug!("📨️ Failure event for order {} ignored. Status is already {}", o.order_id, o.status);
                                Ok(ReconcileOutcome::Ignored)
                            },
                        }
                    },
                    None => {
                        warn!("📨️ Webhook failure for unknown provider order {provider_order_id}. Acknowledged and \
                               dropped.");
                        Ok(ReconcileOutcome::Ignored)
                    },
                }
            },
            PaymentEvent::Other { event } => {
                trace!("📨️ Ignoring webhook event type {event}");
                Ok(ReconcileOutcome::Ignored)
            },
        }
    }

    /// Applies a seller/admin status progression. Only the forward transitions of the state machine are allowed;
    /// everything else is rejected before touching the store.
    pub async fn set_status(&self, order_id: &OrderId, new_status: OrderStatus) -> Result<Order, OrderFlowError> {
        let full = self.db.fetch_order(order_id).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        let current = full.order.status;
        if !current.can_progress_to(new_status) {
            return Err(OrderFlowError::InvalidStatusTransition { order_id: order_id.clone(), from: current, to: new_status });
        }
        match self.db.update_status_if(order_id, current, new_status).await? {
            CasOutcome::Applied(order) => {
                info!("🛒️ Order {order_id} moved from {current} to {new_status}");
                self.call_order_changed_hook(&order, current).await;
                Ok(order)
            },
            CasOutcome::Unchanged(order) => Err(OrderFlowError::InvalidStatusTransition {
                order_id: order_id.clone(),
                from: order.status,
                to: new_status,
            }),
        }
    }

    /// Expires a single pending order, if it is still pending. Used by the reaper and by the manual expiry endpoint.
    pub async fn expire_order(&self, order_id: &OrderId) -> Result<CasOutcome, OrderFlowError> {
        let outcome = self.db.mark_expired_if_pending(order_id).await?;
        if let CasOutcome::Applied(order) = &outcome {
            info!("🕰️ Order {order_id} expired. The payment window closed unpaid.");
            self.call_order_changed_hook(order, OrderStatus::Pending).await;
            // a stamped payment id on an expired order means a capture landed and is owed back
            if let Some(payment_id) = order.payment_id.clone() {
                self.refund_captured_payment(order, &payment_id).await?;
            }
        }
        Ok(outcome)
    }

    /// One reaper sweep: finds every pending order whose payment window has elapsed and expires it. Orders settled
    /// between the scan and the guarded update are reported rather than touched.
    pub async fn expire_stale(&self) -> Result<ExpiryResult, OrderFlowError> {
        let now = Utc::now();
        let stale = self.db.stale_pending_orders(now).await?;
        let mut result = ExpiryResult::default();
        for order in stale {
            match self.db.mark_expired_if_pending(&order.order_id).await? {
                CasOutcome::Applied(expired) => {
                    self.call_order_changed_hook(&expired, OrderStatus::Pending).await;
                    if let Some(payment_id) = expired.payment_id.clone() {
                        self.refund_captured_payment(&expired, &payment_id).await?;
                    }
                    result.expired.push(expired.order_id);
                },
                CasOutcome::Unchanged(o) => result.already_settled.push(o.order_id),
            }
        }
        if result.total_scanned() > 0 {
            info!(
                "🕰️ Expiry sweep complete. {} expired, {} settled in the meantime",
                result.expired.len(),
                result.already_settled.len()
            );
        }
        Ok(result)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<FullOrder>, OrderFlowError> {
        Ok(self.db.fetch_order(order_id).await?)
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<FullOrder>, OrderFlowError> {
        Ok(self.db.search_orders(query).await?)
    }

    pub async fn order_summary(&self, store_id: Option<&str>) -> Result<OrderSummary, OrderFlowError> {
        Ok(self.db.order_summary(store_id).await?)
    }

    async fn call_order_created_hook(&self, order: &FullOrder) {
        for emitter in &self.producers.order_created_producer {
            trace!("🛒️ Notifying order created subscribers");
            emitter.publish_event(OrderCreatedEvent::new(order.clone())).await;
        }
    }

    async fn call_order_changed_hook(&self, order: &Order, old_status: OrderStatus) {
        for emitter in &self.producers.order_changed_producer {
            trace!("🛒️ Notifying order changed subscribers");
            emitter.publish_event(OrderChangedEvent::new(order.clone(), old_status)).await;
        }
    }
}

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use log::*;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

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
    helpers::random_id,
    traits::{StoreError, StorefrontDatabase},
};

const ORDERS_FILE: &str = "orders.json";
const USERS_FILE: &str = "users.json";
const ADDRESSES_FILE: &str = "addresses.json";
const SETTINGS_FILE: &str = "settings.json";
const STORES_DIR: &str = "stores";

/// A JSON-file implementation of [`StorefrontDatabase`].
///
/// All records live in `orders.json` under the root directory, and every write also regenerates a per-store
/// partition under `stores/<store_id>/orders.json` with the line items filtered to that store and the totals
/// recomputed, so each seller's dashboard can keep working off its own file.
///
/// A single async mutex serializes every operation. Throughput is not the point of this tier; not losing orders is.
#[derive(Clone)]
pub struct FileStoreBackend {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileStoreBackend {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf(), lock: Arc::new(Mutex::new(())) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_json<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, StoreError> {
        let path = self.root.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::FallbackError(format!("{}: {e}", path.display())))
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(StoreError::FallbackError(format!("{}: {e}", path.display()))),
        }
    }

    /// Writes via a temp file and rename, so readers never see a half-written document.
    async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::FallbackError(format!("{}: {e}", parent.display())))?;
        }
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| StoreError::FallbackError(format!("{}: {e}", path.display())))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(|e| StoreError::FallbackError(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::FallbackError(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    async fn load_orders(&self) -> Result<Vec<FullOrder>, StoreError> {
        self.read_json(ORDERS_FILE).await
    }

    /// Persists the full order list, then regenerates each seller's partition.
    async fn persist_orders(&self, all: &[FullOrder]) -> Result<(), StoreError> {
        self.write_json(ORDERS_FILE, &all).await?;
        let mut by_store: BTreeMap<String, Vec<FullOrder>> = BTreeMap::new();
        for full in all {
            let mut stores: Vec<&str> = full.items.iter().map(|i| i.store_id.as_str()).collect();
            stores.sort_unstable();
            stores.dedup();
            for sid in stores {
                let items: Vec<_> = full.items.iter().filter(|i| i.store_id == sid).cloned().collect();
                let total = items.iter().map(|i| i.unit_price * i.quantity).sum();
                let mut order = full.order.clone();
                order.total_price = total;
                by_store
                    .entry(sid.to_string())
                    .or_default()
                    .push(FullOrder { order, items, address: full.address.clone() });
            }
        }
        for (sid, orders) in by_store {
            let name = format!("{STORES_DIR}/{sid}/{ORDERS_FILE}");
            self.write_json(&name, &orders).await?;
        }
        Ok(())
    }

    /// Applies a guarded mutation to a single order under the store lock.
    async fn mutate_order<F>(&self, order_id: &OrderId, f: F) -> Result<CasOutcome, StoreError>
    where F: FnOnce(&mut Order) -> bool {
        let _guard = self.lock.lock().await;
        let mut all = self.load_orders().await?;
        let full = all
            .iter_mut()
            .find(|o| &o.order.order_id == order_id)
            .ok_or_else(|| StoreError::OrderNotFound(order_id.clone()))?;
        if f(&mut full.order) {
            full.order.updated_at = Utc::now();
            let updated = full.order.clone();
            self.persist_orders(&all).await?;
            Ok(CasOutcome::Applied(updated))
        } else {
            Ok(CasOutcome::Unchanged(full.order.clone()))
        }
    }
}

impl StorefrontDatabase for FileStoreBackend {
    async fn upsert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let _guard = self.lock.lock().await;
        let mut all: BTreeMap<String, User> = self.read_json(USERS_FILE).await?;
        let now = Utc::now();
        let record = all
            .entry(user.id.clone())
            .and_modify(|u| {
                u.name = user.name.clone();
                u.updated_at = now;
            })
            .or_insert(User { id: user.id, name: user.name, email: user.email, created_at: now, updated_at: now })
            .clone();
        self.write_json(USERS_FILE, &all).await?;
        Ok(record)
    }

    async fn create_address(&self, user_id: &str, address: NewAddress) -> Result<Address, StoreError> {
        let _guard = self.lock.lock().await;
        let mut all: BTreeMap<String, Address> = self.read_json(ADDRESSES_FILE).await?;
        let record = Address {
            id: random_id(),
            user_id: user_id.to_string(),
            name: address.name,
            email: address.email,
            street: address.street,
            city: address.city,
            state: address.state,
            zip: address.zip,
            country: address.country,
            phone: address.phone,
            created_at: Utc::now(),
        };
        all.insert(record.id.clone(), record.clone());
        self.write_json(ADDRESSES_FILE, &all).await?;
        Ok(record)
    }

    // The fallback tier does not maintain a catalogue. Line items carry their own snapshots, so store and product
    // records add nothing that replay into the primary store cannot reconstruct.
    async fn upsert_store(&self, _store: NewStore) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_product(&self, _product: NewProduct) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.load_orders().await?;
        if all.iter().any(|o| o.order.order_id == order.order_id) {
            return Err(StoreError::OrderAlreadyExists(order.order_id));
        }
        let id = all.iter().map(|o| o.order.id).max().unwrap_or(0) + 1;
        let addresses: BTreeMap<String, Address> = self.read_json(ADDRESSES_FILE).await?;
        let address = order.address_id.as_ref().and_then(|aid| addresses.get(aid).cloned());
        let record = Order {
            id,
            order_id: order.order_id.clone(),
            user_id: order.user_id,
            store_id: order.store_id,
            address_id: order.address_id,
            total_price: order.total_price,
            currency: order.currency,
            status: order.status,
            payment_method: order.payment_method,
            provider_order_id: None,
            payment_id: None,
            refund_id: None,
            refund_pending: false,
            failure_reason: None,
            coupon_used: order.coupon_used,
            via_fallback: order.via_fallback,
            fallback_reason: order.fallback_reason,
            created_at: order.created_at,
            updated_at: order.created_at,
            expires_at: order.expires_at,
        };
        let items = order
            .items
            .into_iter()
            .enumerate()
            .map(|(i, item)| crate::db_types::LineItem {
                id: i as i64 + 1,
                order_id: order.order_id.clone(),
                product_id: item.product_id,
                store_id: item.store_id,
                name: item.name,
                image: item.image,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();
        all.push(FullOrder { order: record.clone(), items, address });
        self.persist_orders(&all).await?;
        info!("🛟️ Order {} captured in the fallback store", record.order_id);
        Ok(record)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<FullOrder>, StoreError> {
        let _guard = self.lock.lock().await;
        let all = self.load_orders().await?;
        Ok(all.into_iter().find(|o| &o.order.order_id == order_id))
    }

    async fn fetch_order_by_provider_order_id(&self, provider_order_id: &str) -> Result<Option<Order>, StoreError> {
        let _guard = self.lock.lock().await;
        let all = self.load_orders().await?;
        Ok(all.into_iter().map(|o| o.order).find(|o| o.provider_order_id.as_deref() == Some(provider_order_id)))
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<FullOrder>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.load_orders().await?;
        all.retain(|o| {
            query.user_id.as_deref().map(|u| o.order.user_id == u).unwrap_or(true)
                && query.store_id.as_deref().map(|s| o.items.iter().any(|i| i.store_id == s)).unwrap_or(true)
                && query.status.map(|s| o.order.status == s).unwrap_or(true)
                && query.since.map(|t| o.order.created_at >= t).unwrap_or(true)
                && query.until.map(|t| o.order.created_at <= t).unwrap_or(true)
        });
        all.sort_by(|a, b| b.order.created_at.cmp(&a.order.created_at));
        if let Some(limit) = query.limit {
            all.truncate(limit.max(0) as usize);
        }
        Ok(all)
    }

    async fn stale_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let _guard = self.lock.lock().await;
        let all = self.load_orders().await?;
        Ok(all.into_iter().map(|o| o.order).filter(|o| o.is_expired_at(now)).collect())
    }

    async fn order_summary(&self, store_id: Option<&str>) -> Result<OrderSummary, StoreError> {
        let _guard = self.lock.lock().await;
        let all = self.load_orders().await?;
        let mut summary = OrderSummary::default();
        for full in all {
            if let Some(sid) = store_id {
                if !full.items.iter().any(|i| i.store_id == sid) {
                    continue;
                }
            }
            if full.order.status == OrderStatus::Cancelled {
                summary.cancelled += 1;
            } else {
                summary.total_orders += 1;
                let amount = match store_id {
                    Some(sid) => {
                        full.items.iter().filter(|i| i.store_id == sid).map(|i| i.unit_price * i.quantity).sum()
                    },
                    None => full.order.total_price,
                };
                summary.total_amount = summary.total_amount + amount;
            }
        }
        Ok(summary)
    }

    async fn set_provider_order_id(&self, order_id: &OrderId, provider_order_id: &str) -> Result<Order, StoreError> {
        let outcome = self
            .mutate_order(order_id, |o| {
                o.provider_order_id = Some(provider_order_id.to_string());
                true
            })
            .await?;
        Ok(outcome.into_order())
    }

    async fn mark_placed_if_pending(
        &self,
        order_id: &OrderId,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CasOutcome, StoreError> {
        let payment_id = payment_id.to_string();
        self.mutate_order(order_id, move |o| {
            let in_window = o.expires_at.map(|t| t > now).unwrap_or(true);
            if o.status == OrderStatus::Pending && in_window {
                o.status = OrderStatus::Placed;
                o.payment_id = Some(payment_id);
                true
            } else {
                false
            }
        })
        .await
    }

    async fn mark_expired_if_pending(&self, order_id: &OrderId) -> Result<CasOutcome, StoreError> {
        self.mutate_order(order_id, |o| {
            if o.status == OrderStatus::Pending {
                o.status = OrderStatus::Expired;
                true
            } else {
                false
            }
        })
        .await
    }

    async fn mark_failed_if_pending(&self, order_id: &OrderId, reason: &str) -> Result<CasOutcome, StoreError> {
        let reason = reason.to_string();
        self.mutate_order(order_id, move |o| {
            if o.status == OrderStatus::Pending {
                o.status = OrderStatus::Failed;
                o.failure_reason = Some(reason);
                true
            } else {
                false
            }
        })
        .await
    }

    async fn update_status_if(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<CasOutcome, StoreError> {
        self.mutate_order(order_id, move |o| {
            if o.status == from {
                o.status = to;
                true
            } else {
                false
            }
        })
        .await
    }

    async fn record_refund(&self, order_id: &OrderId, refund_id: Option<&str>) -> Result<CasOutcome, StoreError> {
        let refund_id = refund_id.map(str::to_string);
        self.mutate_order(order_id, move |o| {
            if o.refund_id.is_some() {
                return false;
            }
            match refund_id {
                // settle the open claim
                Some(rid) => {
                    o.refund_id = Some(rid);
                    o.refund_pending = false;
                    true
                },
                // claim the refund; a second claim loses
                None => {
                    if o.refund_pending {
                        false
                    } else {
                        o.refund_pending = true;
                        true
                    }
                },
            }
        })
        .await
    }

    async fn fetch_setting(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let _guard = self.lock.lock().await;
        let all: BTreeMap<String, serde_json::Value> = self.read_json(SETTINGS_FILE).await?;
        Ok(all.get(key).cloned())
    }

    async fn upsert_setting(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut all: BTreeMap<String, serde_json::Value> = self.read_json(SETTINGS_FILE).await?;
        all.insert(key.to_string(), value.clone());
        self.write_json(SETTINGS_FILE, &all).await
    }
}

#[cfg(test)]
mod test {
    use spg_common::MinorUnits;

    use super::*;
    use crate::db_types::{NewLineItem, PaymentMethod};

    fn new_order(oid: &str, items: Vec<NewLineItem>) -> NewOrder {
        let mut order = NewOrder::new("u1".into(), items[0].store_id.clone(), items);
        order.order_id = OrderId(oid.to_string());
        order.payment_method = PaymentMethod::Gateway;
        order
    }

    fn item(store: &str, price: i64, qty: i64) -> NewLineItem {
        NewLineItem {
            product_id: format!("p-{store}"),
            store_id: store.into(),
            name: "Thing".into(),
            image: String::new(),
            quantity: qty,
            unit_price: MinorUnits::from(price),
        }
    }

    #[tokio::test]
    async fn orders_partition_per_store_with_recomputed_totals() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStoreBackend::new(dir.path());
        let order = new_order("ord-1", vec![item("alpha", 1000, 2), item("beta", 500, 1)]);
        store.insert_order(order).await.unwrap();

        let main: Vec<FullOrder> =
            serde_json::from_slice(&std::fs::read(dir.path().join("orders.json")).unwrap()).unwrap();
        assert_eq!(main.len(), 1);
        assert_eq!(main[0].order.total_price, MinorUnits::from(2500));

        let alpha: Vec<FullOrder> =
            serde_json::from_slice(&std::fs::read(dir.path().join("stores/alpha/orders.json")).unwrap()).unwrap();
        assert_eq!(alpha[0].items.len(), 1);
        assert_eq!(alpha[0].order.total_price, MinorUnits::from(2000));

        let beta: Vec<FullOrder> =
            serde_json::from_slice(&std::fs::read(dir.path().join("stores/beta/orders.json")).unwrap()).unwrap();
        assert_eq!(beta[0].order.total_price, MinorUnits::from(500));
    }

    #[tokio::test]
    async fn duplicate_order_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStoreBackend::new(dir.path());
        store.insert_order(new_order("ord-1", vec![item("alpha", 100, 1)])).await.unwrap();
        let err = store.insert_order(new_order("ord-1", vec![item("alpha", 100, 1)])).await.unwrap_err();
        assert!(matches!(err, StoreError::OrderAlreadyExists(_)));
    }

    #[tokio::test]
    async fn guarded_updates_apply_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStoreBackend::new(dir.path());
        let oid = OrderId("ord-cas".to_string());
        store.insert_order(new_order("ord-cas", vec![item("alpha", 100, 1)])).await.unwrap();

        let first = store.mark_placed_if_pending(&oid, "pay_1", Utc::now()).await.unwrap();
        assert!(first.is_applied());
        assert_eq!(first.order().payment_id.as_deref(), Some("pay_1"));

        let second = store.mark_placed_if_pending(&oid, "pay_2", Utc::now()).await.unwrap();
        assert!(!second.is_applied());
        assert_eq!(second.order().payment_id.as_deref(), Some("pay_1"));

        let expire = store.mark_expired_if_pending(&oid).await.unwrap();
        assert!(!expire.is_applied());
    }

    #[tokio::test]
    async fn refunds_are_recorded_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStoreBackend::new(dir.path());
        let oid = OrderId("ord-r".to_string());
        store.insert_order(new_order("ord-r", vec![item("alpha", 100, 1)])).await.unwrap();

        // the first claim wins; the second loses
        assert!(store.record_refund(&oid, None).await.unwrap().is_applied());
        let second_claim = store.record_refund(&oid, None).await.unwrap();
        assert!(!second_claim.is_applied());
        assert!(second_claim.order().refund_pending);

        // the winner settles its claim; nothing matches after that
        let settled = store.record_refund(&oid, Some("rfnd_1")).await.unwrap();
        assert!(settled.is_applied());
        assert!(!settled.order().refund_pending);
        let again = store.record_refund(&oid, Some("rfnd_2")).await.unwrap();
        assert!(!again.is_applied());
        assert_eq!(again.order().refund_id.as_deref(), Some("rfnd_1"));
    }

    #[tokio::test]
    async fn summary_excludes_cancelled_orders() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStoreBackend::new(dir.path());
        store.insert_order(new_order("ord-a", vec![item("alpha", 1000, 1)])).await.unwrap();
        store.insert_order(new_order("ord-b", vec![item("alpha", 500, 1)])).await.unwrap();
        store
            .update_status_if(&OrderId("ord-b".into()), OrderStatus::Pending, OrderStatus::Cancelled)
            .await
            .unwrap();

        let summary = store.order_summary(None).await.unwrap();
        assert_eq!(summary.total_orders, 1);
        assert_eq!(summary.total_amount, MinorUnits::from(1000));
        assert_eq!(summary.cancelled, 1);
    }
}

use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    api::order_objects::OrderQueryFilter,
    db_types::{CasOutcome, LineItem, NewOrder, Order, OrderId, OrderStatus},
    traits::StoreError,
};

/// Inserts a new order and its line-item snapshots using the given connection. This is not atomic on its own. Embed
/// the call inside a transaction and pass `&mut *tx` as the connection argument to make it so.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, StoreError> {
    if fetch_order_by_order_id(&order.order_id, conn).await?.is_some() {
        return Err(StoreError::OrderAlreadyExists(order.order_id));
    }
    let items = order.items;
    let inserted: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                user_id,
                store_id,
                address_id,
                total_price,
                currency,
                status,
                payment_method,
                coupon_used,
                via_fallback,
                fallback_reason,
                created_at,
                updated_at,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12, $13)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.user_id)
    .bind(order.store_id)
    .bind(order.address_id)
    .bind(order.total_price)
    .bind(order.currency)
    .bind(order.status)
    .bind(order.payment_method)
    .bind(order.coupon_used)
    .bind(order.via_fallback)
    .bind(order.fallback_reason)
    .bind(order.created_at)
    .bind(order.expires_at)
    .fetch_one(&mut *conn)
    .await?;
    for item in items {
        sqlx::query(
            "INSERT INTO line_items (order_id, product_id, store_id, name, image, quantity, unit_price) VALUES ($1, \
             $2, $3, $4, $5, $6, $7)",
        )
        .bind(&inserted.order_id)
        .bind(item.product_id)
        .bind(item.store_id)
        .bind(item.name)
        .bind(item.image)
        .bind(item.quantity)
        .bind(item.unit_price)
        .execute(&mut *conn)
        .await?;
    }
    Ok(inserted)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await
}

pub async fn fetch_order_by_provider_order_id(
    provider_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE provider_order_id = $1")
        .bind(provider_order_id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_line_items(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<LineItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM line_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at`, newest first.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    // limit alone is not a WHERE criterion
    let has_criteria = query.user_id.is_some()
        || query.store_id.is_some()
        || query.status.is_some()
        || query.since.is_some()
        || query.until.is_some();
    if has_criteria {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(user_id) = query.user_id {
        where_clause.push("user_id = ");
        where_clause.push_bind_unseparated(user_id);
    }
    if let Some(store_id) = query.store_id {
        where_clause.push("store_id = ");
        where_clause.push_bind_unseparated(store_id);
    }
    if let Some(status) = query.status {
        where_clause.push("status = ");
        where_clause.push_bind_unseparated(status.to_string());
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at DESC");
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }

    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ search_orders returned {} orders", orders.len());
    Ok(orders)
}

/// All `Pending` orders whose payment window has elapsed at `now`.
pub async fn stale_pending_orders(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM orders WHERE status = 'Pending' AND expires_at IS NOT NULL AND julianday(expires_at) <= \
         julianday($1) ORDER BY created_at",
    )
    .bind(now)
    .fetch_all(conn)
    .await
}

/// Aggregate count and revenue, excluding cancelled orders from the totals. Cancelled orders are counted separately.
pub async fn order_summary(
    store_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(i64, i64, i64), sqlx::Error> {
    let sql = r#"
        SELECT
            COALESCE(SUM(CASE WHEN status != 'Cancelled' THEN 1 ELSE 0 END), 0) AS total_orders,
            COALESCE(SUM(CASE WHEN status != 'Cancelled' THEN total_price ELSE 0 END), 0) AS total_amount,
            COALESCE(SUM(CASE WHEN status = 'Cancelled' THEN 1 ELSE 0 END), 0) AS cancelled
        FROM orders
    "#;
    match store_id {
        Some(sid) => {
            sqlx::query_as(&format!("{sql} WHERE store_id = $1")).bind(sid).fetch_one(conn).await
        },
        None => sqlx::query_as(sql).fetch_one(conn).await,
    }
}

pub async fn set_provider_order_id(
    order_id: &OrderId,
    provider_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, StoreError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET provider_order_id = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 RETURNING *",
    )
    .bind(provider_order_id)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    result.ok_or_else(|| StoreError::OrderNotFound(order_id.clone()))
}

/// Resolves a guarded update: a row back from `RETURNING *` means the guard matched; no row means either the guard
/// failed (return the current record) or the order does not exist at all.
async fn cas_result(
    updated: Option<Order>,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<CasOutcome, StoreError> {
    match updated {
        Some(order) => Ok(CasOutcome::Applied(order)),
        None => {
            let current = fetch_order_by_order_id(order_id, conn)
                .await?
                .ok_or_else(|| StoreError::OrderNotFound(order_id.clone()))?;
            Ok(CasOutcome::Unchanged(current))
        },
    }
}

/// Guard: status is `Pending` and the payment window has not elapsed at `now`.
/// Effect: status becomes `Placed` and the payment id is stamped.
pub async fn mark_placed_if_pending(
    order_id: &OrderId,
    payment_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CasOutcome, StoreError> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET status = 'Placed', payment_id = $1, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $2
              AND status = 'Pending'
              AND (expires_at IS NULL OR julianday(expires_at) > julianday($3))
            RETURNING *;
        "#,
    )
    .bind(payment_id)
    .bind(order_id.as_str())
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;
    cas_result(updated, order_id, conn).await
}

/// Guard: status is `Pending`. Effect: status becomes `Expired`.
pub async fn mark_expired_if_pending(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<CasOutcome, StoreError> {
    let updated: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = 'Expired', updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND status = \
         'Pending' RETURNING *",
    )
    .bind(order_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    cas_result(updated, order_id, conn).await
}

/// Guard: status is `Pending`. Effect: status becomes `Failed` and the failure reason is recorded.
pub async fn mark_failed_if_pending(
    order_id: &OrderId,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<CasOutcome, StoreError> {
    let updated: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = 'Failed', failure_reason = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = \
         $2 AND status = 'Pending' RETURNING *",
    )
    .bind(reason)
    .bind(order_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    cas_result(updated, order_id, conn).await
}

/// Guard: current status equals `from`. Effect: status becomes `to`.
pub async fn update_status_if(
    order_id: &OrderId,
    from: OrderStatus,
    to: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<CasOutcome, StoreError> {
    let updated: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 AND status = $3 RETURNING \
         *",
    )
    .bind(to.to_string())
    .bind(order_id.as_str())
    .bind(from.to_string())
    .fetch_optional(&mut *conn)
    .await?;
    cas_result(updated, order_id, conn).await
}

/// Records a refund at most once. `None` claims the refund by setting the pending flag; `Some(refund_id)` settles
/// an open claim by stamping the id. An order with a refund id never matches either guard again.
pub async fn record_refund(
    order_id: &OrderId,
    refund_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<CasOutcome, StoreError> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET
                refund_id = $1,
                refund_pending = CASE WHEN $1 IS NULL THEN 1 ELSE 0 END,
                updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $2 AND refund_id IS NULL AND ($1 IS NOT NULL OR refund_pending = 0)
            RETURNING *;
        "#,
    )
    .bind(refund_id)
    .bind(order_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    cas_result(updated, order_id, conn).await
}

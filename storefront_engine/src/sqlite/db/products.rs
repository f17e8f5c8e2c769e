use sqlx::SqliteConnection;

use crate::db_types::{NewProduct, NewStore};

/// Creates the store if it is not already on record. An existing store is never modified here; that is the
/// seller-management surface's job, which this engine does not own.
pub async fn upsert_store(store: NewStore, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO stores (id, owner_id, name) VALUES ($1, $2, $3)")
        .bind(store.id)
        .bind(store.owner_id)
        .bind(store.name)
        .execute(conn)
        .await?;
    Ok(())
}

/// Creates the product if it is not already on record. Order line items snapshot their own price and name, so a
/// placeholder row here is only ever advisory.
pub async fn upsert_product(product: NewProduct, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT OR IGNORE INTO products (id, store_id, name, description, price, image, category) VALUES ($1, $2, \
         $3, $4, $5, $6, $7)",
    )
    .bind(product.id)
    .bind(product.store_id)
    .bind(product.name)
    .bind(product.description)
    .bind(product.price)
    .bind(product.image)
    .bind(product.category)
    .execute(conn)
    .await?;
    Ok(())
}

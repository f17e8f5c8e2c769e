use sqlx::SqliteConnection;

use crate::{
    db_types::{Address, NewAddress, NewUser, User},
    helpers::random_id,
};

/// Creates the user, or refreshes its display name if it already exists.
pub async fn upsert_user(user: NewUser, conn: &mut SqliteConnection) -> Result<User, sqlx::Error> {
    let user = sqlx::query_as(
        r#"
            INSERT INTO users (id, name, email) VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = excluded.name, updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(user.id)
    .bind(user.name)
    .bind(user.email)
    .fetch_one(conn)
    .await?;
    Ok(user)
}

/// Inserts a fresh address record for the user. One record per order; nothing is deduplicated.
pub async fn insert_address(user_id: &str, address: NewAddress, conn: &mut SqliteConnection) -> Result<Address, sqlx::Error> {
    let address = sqlx::query_as(
        r#"
            INSERT INTO addresses (id, user_id, name, email, street, city, state, zip, country, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(random_id())
    .bind(user_id)
    .bind(address.name)
    .bind(address.email)
    .bind(address.street)
    .bind(address.city)
    .bind(address.state)
    .bind(address.zip)
    .bind(address.country)
    .bind(address.phone)
    .fetch_one(conn)
    .await?;
    Ok(address)
}

pub async fn fetch_address(id: &str, conn: &mut SqliteConnection) -> Result<Option<Address>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM addresses WHERE id = $1").bind(id).fetch_optional(conn).await
}

//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool, or create an atomic transaction as
//! the need arises and call through to the functions without any other changes.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod orders;
pub mod products;
pub mod settings;
pub mod users;

const SQLITE_DB_URL: &str = "sqlite://data/storefront.db";

pub fn db_url() -> String {
    let result = env::var("SPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("SPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

/// Creates the schema if it does not exist yet. Idempotent, and runs on every startup.
pub async fn create_schema(pool: &SqlitePool) -> Result<(), SqlxError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id         TEXT PRIMARY KEY,
            name       TEXT NOT NULL,
            email      TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS addresses (
            id         TEXT PRIMARY KEY,
            user_id    TEXT NOT NULL,
            name       TEXT NOT NULL,
            email      TEXT NOT NULL,
            street     TEXT NOT NULL,
            city       TEXT NOT NULL,
            state      TEXT NOT NULL,
            zip        TEXT NOT NULL,
            country    TEXT NOT NULL,
            phone      TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS stores (
            id         TEXT PRIMARY KEY,
            owner_id   TEXT NOT NULL,
            name       TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS products (
            id          TEXT PRIMARY KEY,
            store_id    TEXT NOT NULL,
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            price       INTEGER NOT NULL,
            image       TEXT NOT NULL DEFAULT '',
            category    TEXT NOT NULL DEFAULT 'uncategorized',
            created_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS orders (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id          TEXT NOT NULL UNIQUE,
            user_id           TEXT NOT NULL,
            store_id          TEXT NOT NULL,
            address_id        TEXT,
            total_price       INTEGER NOT NULL,
            currency          TEXT NOT NULL,
            status            TEXT NOT NULL DEFAULT 'Pending',
            payment_method    TEXT NOT NULL,
            provider_order_id TEXT,
            payment_id        TEXT,
            refund_id         TEXT,
            refund_pending    INTEGER NOT NULL DEFAULT 0,
            failure_reason    TEXT,
            coupon_used       INTEGER NOT NULL DEFAULT 0,
            via_fallback      INTEGER NOT NULL DEFAULT 0,
            fallback_reason   TEXT,
            created_at        TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at        TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            expires_at        TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS orders_status_ix ON orders (status);
        CREATE INDEX IF NOT EXISTS orders_provider_ix ON orders (provider_order_id);
        CREATE INDEX IF NOT EXISTS orders_user_ix ON orders (user_id);

        CREATE TABLE IF NOT EXISTS line_items (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id   TEXT NOT NULL REFERENCES orders (order_id),
            product_id TEXT NOT NULL,
            store_id   TEXT NOT NULL,
            name       TEXT NOT NULL,
            image      TEXT NOT NULL DEFAULT '',
            quantity   INTEGER NOT NULL,
            unit_price INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS line_items_order_ix ON line_items (order_id);

        CREATE TABLE IF NOT EXISTS settings (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

use sqlx::SqliteConnection;

use crate::traits::StoreError;

pub async fn fetch_setting(key: &str, conn: &mut SqliteConnection) -> Result<Option<serde_json::Value>, StoreError> {
    let raw: Option<(String,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = $1").bind(key).fetch_optional(conn).await?;
    match raw {
        Some((value,)) => Ok(Some(serde_json::from_str(&value)?)),
        None => Ok(None),
    }
}

pub async fn upsert_setting(key: &str, value: &serde_json::Value, conn: &mut SqliteConnection) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    sqlx::query(
        r#"
            INSERT INTO settings (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(key)
    .bind(raw)
    .execute(conn)
    .await?;
    Ok(())
}

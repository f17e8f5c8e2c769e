use crate::traits::{StoreError, StorefrontDatabase};

/// Read/write access to operator-facing configuration values, stored as JSON documents keyed by name.
#[derive(Clone)]
pub struct SettingsApi<B> {
    db: B,
}

impl<B> SettingsApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> SettingsApi<B>
where B: StorefrontDatabase
{
    pub async fn fetch(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.db.fetch_setting(key).await
    }

    pub async fn upsert(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        self.db.upsert_setting(key, value).await
    }
}

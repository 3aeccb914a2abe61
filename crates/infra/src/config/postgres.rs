//! `system_settings` table as a settings source.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::ledger_store::StoreError;
use crate::ledger_store::postgres::map_sqlx_error;

use super::SettingsSource;

#[derive(Debug, Clone)]
pub struct PostgresSettings {
    pool: PgPool,
}

impl PostgresSettings {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsSource for PostgresSettings {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM system_settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_setting", e))?;

        row.map(|r| r.try_get::<String, _>("value"))
            .transpose()
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

//! Postgres-backed ledger store.
//!
//! ## Locking
//!
//! `lock_stock` inserts the row with `ON CONFLICT DO NOTHING` and then reads it
//! back with `SELECT ... FOR UPDATE`, so the row exists and is locked until the
//! transaction ends. Concurrent operations on the same key queue on that lock.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (check violation) | `23514` | `Backend` |
//! | Database (other) | Any other | `Backend` |
//! | RowNotFound | N/A | `NotFound` |
//! | Other | N/A | `Backend` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use epiledger_core::{EquipmentTypeId, MovementId, StockRowId, UserId, WarehouseId};
use epiledger_stock::{
    Movement, MovementType, SourceKind, SourceRef, StockEffect, StockKey, StockRow, StockStatus,
};

use super::r#trait::{LedgerStore, LedgerTx, StoreError};

/// Schema applied by [`PostgresLedgerStore::apply_schema`].
pub const SCHEMA: &str = include_str!("../../migrations/0001_stock_ledger.sql");

const STOCK_COLUMNS: &str =
    "id, warehouse_id, equipment_type_id, status, quantity, unit_cost, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, stock_row_id, warehouse_id, equipment_type_id, status, \
     movement_type, effect, quantity, balance_before, balance_after, responsible_user_id, \
     occurred_at, source_kind, source_id, reversal_of_movement_id, reason";

/// Postgres-backed ledger store.
///
/// `PostgresLedgerStore` is `Send + Sync` and cheap to clone; all operations go
/// through the SQLx connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    type Tx = PostgresLedgerTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresLedgerTx { tx })
    }
}

/// Unit of work backed by a database transaction.
///
/// Dropping it without `commit()` rolls the transaction back.
pub struct PostgresLedgerTx {
    tx: Transaction<'static, Postgres>,
}

impl PostgresLedgerTx {
    async fn fetch_movements(&mut self, sql: &str, bind: Uuid) -> Result<Vec<Movement>, StoreError> {
        let rows = sqlx::query(sql)
            .bind(bind)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("fetch_movements", e))?;
        rows.iter().map(decode_movement).collect()
    }

    async fn fetch_movement(&mut self, sql: &str, bind: Uuid) -> Result<Option<Movement>, StoreError> {
        let row = sqlx::query(sql)
            .bind(bind)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("fetch_movement", e))?;
        row.as_ref().map(decode_movement).transpose()
    }
}

#[async_trait]
impl LedgerTx for PostgresLedgerTx {
    async fn lock_stock(&mut self, key: StockKey) -> Result<StockRow, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stock_rows (id, warehouse_id, equipment_type_id, status, quantity)
            VALUES ($1, $2, $3, $4, 0)
            ON CONFLICT (warehouse_id, equipment_type_id, status) DO NOTHING
            "#,
        )
        .bind(*StockRowId::new().as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .bind(key.equipment_type_id.as_uuid())
        .bind(key.status.code())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("create_stock_row", e))?;

        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM stock_rows \
             WHERE warehouse_id = $1 AND equipment_type_id = $2 AND status = $3 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(key.warehouse_id.as_uuid())
            .bind(key.equipment_type_id.as_uuid())
            .bind(key.status.code())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_stock_row", e))?;
        decode_stock(&row)
    }

    async fn find_stock(&mut self, key: StockKey) -> Result<Option<StockRow>, StoreError> {
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM stock_rows \
             WHERE warehouse_id = $1 AND equipment_type_id = $2 AND status = $3"
        );
        let row = sqlx::query(&sql)
            .bind(key.warehouse_id.as_uuid())
            .bind(key.equipment_type_id.as_uuid())
            .bind(key.status.code())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_stock", e))?;
        row.as_ref().map(decode_stock).transpose()
    }

    async fn write_stock(&mut self, row: &StockRow) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE stock_rows SET quantity = $2, unit_cost = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(row.id.as_uuid())
        .bind(row.quantity)
        .bind(row.unit_cost)
        .bind(row.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("write_stock", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("stock row {}", row.id)));
        }
        Ok(())
    }

    async fn insert_movement(&mut self, movement: &Movement) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, stock_row_id, warehouse_id, equipment_type_id, status,
                movement_type, effect, quantity, balance_before, balance_after,
                responsible_user_id, occurred_at, source_kind, source_id,
                reversal_of_movement_id, reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.stock_row_id.as_uuid())
        .bind(movement.key.warehouse_id.as_uuid())
        .bind(movement.key.equipment_type_id.as_uuid())
        .bind(movement.key.status.code())
        .bind(movement.movement_type.code())
        .bind(movement.effect.code())
        .bind(movement.quantity)
        .bind(movement.balance_before)
        .bind(movement.balance_after)
        .bind(movement.responsible_user_id.as_uuid())
        .bind(movement.occurred_at)
        .bind(movement.source.map(|s| s.kind.code()))
        .bind(movement.source.map(|s| s.id))
        .bind(movement.reversal_of.map(Uuid::from))
        .bind(movement.reason.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) && movement.reversal_of.is_some() {
                StoreError::Conflict(format!(
                    "movement {} already has a reversal",
                    movement.reversal_of.map(|id| id.to_string()).unwrap_or_default()
                ))
            } else {
                map_sqlx_error("insert_movement", e)
            }
        })?;
        Ok(())
    }

    async fn find_movement(&mut self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE id = $1");
        self.fetch_movement(&sql, *id.as_uuid()).await
    }

    async fn find_reversal_of(&mut self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE reversal_of_movement_id = $1"
        );
        self.fetch_movement(&sql, *id.as_uuid()).await
    }

    async fn latest_movement_for_row(
        &mut self,
        row_id: StockRowId,
    ) -> Result<Option<Movement>, StoreError> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE stock_row_id = $1 ORDER BY ledger_position DESC LIMIT 1"
        );
        self.fetch_movement(&sql, *row_id.as_uuid()).await
    }

    async fn movements_for_row(&mut self, row_id: StockRowId) -> Result<Vec<Movement>, StoreError> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE stock_row_id = $1 ORDER BY ledger_position ASC"
        );
        self.fetch_movements(&sql, *row_id.as_uuid()).await
    }

    async fn movements_by_source(&mut self, source: SourceRef) -> Result<Vec<Movement>, StoreError> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE source_kind = $1 AND source_id = $2 ORDER BY ledger_position ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(source.kind.code())
            .bind(source.id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("movements_by_source", e))?;
        rows.iter().map(decode_movement).collect()
    }

    async fn stock_for_warehouse(
        &mut self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<StockRow>, StoreError> {
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM stock_rows WHERE warehouse_id = $1 \
             ORDER BY equipment_type_id, status"
        );
        let rows = sqlx::query(&sql)
            .bind(warehouse_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("stock_for_warehouse", e))?;
        rows.iter().map(decode_stock).collect()
    }

    async fn all_stock(&mut self) -> Result<Vec<StockRow>, StoreError> {
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM stock_rows ORDER BY warehouse_id, equipment_type_id, status"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("all_stock", e))?;
        rows.iter().map(decode_stock).collect()
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

fn decode_stock(row: &PgRow) -> Result<StockRow, StoreError> {
    let status: String = row.try_get("status").map_err(decode_error)?;
    let status = StockStatus::from_code(&status).map_err(|e| StoreError::Decode(e.to_string()))?;
    let warehouse_id: Uuid = row.try_get("warehouse_id").map_err(decode_error)?;
    let equipment_type_id: Uuid = row.try_get("equipment_type_id").map_err(decode_error)?;
    let id: Uuid = row.try_get("id").map_err(decode_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode_error)?;

    Ok(StockRow {
        id: StockRowId::from_uuid(id),
        key: StockKey::new(
            WarehouseId::from_uuid(warehouse_id),
            EquipmentTypeId::from_uuid(equipment_type_id),
            status,
        ),
        quantity: row.try_get("quantity").map_err(decode_error)?,
        unit_cost: row.try_get("unit_cost").map_err(decode_error)?,
        created_at,
        updated_at,
    })
}

fn decode_movement(row: &PgRow) -> Result<Movement, StoreError> {
    let movement_type: String = row.try_get("movement_type").map_err(decode_error)?;
    let movement_type = MovementType::from_code(&movement_type)
        .ok_or(StoreError::UnsupportedMovementType(movement_type))?;

    let status: String = row.try_get("status").map_err(decode_error)?;
    let status = StockStatus::from_code(&status).map_err(|e| StoreError::Decode(e.to_string()))?;
    let effect: String = row.try_get("effect").map_err(decode_error)?;
    let effect = StockEffect::from_code(&effect).map_err(|e| StoreError::Decode(e.to_string()))?;

    let source_kind: Option<String> = row.try_get("source_kind").map_err(decode_error)?;
    let source_id: Option<Uuid> = row.try_get("source_id").map_err(decode_error)?;
    let source = match (source_kind, source_id) {
        (Some(kind), Some(id)) => Some(SourceRef::new(
            SourceKind::from_code(&kind).map_err(|e| StoreError::Decode(e.to_string()))?,
            id,
        )),
        _ => None,
    };

    let id: Uuid = row.try_get("id").map_err(decode_error)?;
    let stock_row_id: Uuid = row.try_get("stock_row_id").map_err(decode_error)?;
    let warehouse_id: Uuid = row.try_get("warehouse_id").map_err(decode_error)?;
    let equipment_type_id: Uuid = row.try_get("equipment_type_id").map_err(decode_error)?;
    let responsible_user_id: Uuid = row.try_get("responsible_user_id").map_err(decode_error)?;
    let reversal_of: Option<Uuid> = row.try_get("reversal_of_movement_id").map_err(decode_error)?;

    Ok(Movement {
        id: MovementId::from_uuid(id),
        stock_row_id: StockRowId::from_uuid(stock_row_id),
        key: StockKey::new(
            WarehouseId::from_uuid(warehouse_id),
            EquipmentTypeId::from_uuid(equipment_type_id),
            status,
        ),
        movement_type,
        effect,
        quantity: row.try_get("quantity").map_err(decode_error)?,
        balance_before: row.try_get("balance_before").map_err(decode_error)?,
        balance_after: row.try_get("balance_after").map_err(decode_error)?,
        responsible_user_id: UserId::from_uuid(responsible_user_id),
        occurred_at: row.try_get("occurred_at").map_err(decode_error)?,
        source,
        reversal_of: reversal_of.map(MovementId::from_uuid),
        reason: row.try_get("reason").map_err(decode_error)?,
    })
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Decode(err.to_string())
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("row not found in {operation}")),
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code == "23505";
        }
    }
    false
}

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use epiledger_core::{MovementId, StockRowId, WarehouseId};
use epiledger_stock::{Movement, SourceRef, StockKey, StockRow};

/// Ledger store operation error.
///
/// These are **infrastructure errors** as opposed to domain errors.
///
/// - **NotFound**: a row the caller expected to exist is missing
/// - **Conflict**: a uniqueness guarantee fired (e.g. second reversal of a movement)
/// - **UnsupportedMovementType**: a stored movement carries a type code this build does not know
/// - **Backend**: connection, IO or database failure
/// - **Decode**: a stored row could not be mapped back to a domain value
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unsupported movement type: {0}")]
    UnsupportedMovementType(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("failed to decode stored row: {0}")]
    Decode(String),
}

/// Source of units of work over stock rows and movements.
///
/// ## Isolation
///
/// A transaction returned by `begin()` must lock every stock row it obtains
/// through `lock_stock` until it commits or is dropped, so two concurrent
/// operations on the same key are serialised (no lost updates). Reads through
/// the other methods see at least committed data.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: LedgerTx;

    /// Open a unit of work.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// One unit of work.
///
/// Writes become visible only after `commit()`. Dropping the transaction
/// without committing rolls every write back; this is the only cancellation
/// path.
#[async_trait]
pub trait LedgerTx: Send {
    /// Fetch the row for `key`, creating a zero-balance row if absent, and
    /// lock it for the rest of the transaction.
    async fn lock_stock(&mut self, key: StockKey) -> Result<StockRow, StoreError>;

    /// Fetch the row for `key` without creating or locking it.
    async fn find_stock(&mut self, key: StockKey) -> Result<Option<StockRow>, StoreError>;

    /// Persist quantity, unit cost and `updated_at` of a locked row.
    async fn write_stock(&mut self, row: &StockRow) -> Result<(), StoreError>;

    /// Append a movement. Fails with `Conflict` if `reversal_of` already has a
    /// reversal.
    async fn insert_movement(&mut self, movement: &Movement) -> Result<(), StoreError>;

    async fn find_movement(&mut self, id: MovementId) -> Result<Option<Movement>, StoreError>;

    /// The reversal that points at `id`, if any.
    async fn find_reversal_of(&mut self, id: MovementId) -> Result<Option<Movement>, StoreError>;

    /// Most recent movement on a row.
    async fn latest_movement_for_row(
        &mut self,
        row_id: StockRowId,
    ) -> Result<Option<Movement>, StoreError>;

    /// All movements on a row, in ledger order.
    async fn movements_for_row(&mut self, row_id: StockRowId) -> Result<Vec<Movement>, StoreError>;

    /// All movements linked to a source document, in ledger order.
    async fn movements_by_source(&mut self, source: SourceRef) -> Result<Vec<Movement>, StoreError>;

    async fn stock_for_warehouse(
        &mut self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<StockRow>, StoreError>;

    async fn all_stock(&mut self) -> Result<Vec<StockRow>, StoreError>;

    /// Make every write of this transaction durable.
    async fn commit(self) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        (**self).begin().await
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use epiledger_core::{EquipmentTypeId, MovementId, StockRowId, WarehouseId};
use epiledger_stock::{Movement, SourceRef, StockKey, StockRow};

use super::r#trait::{LedgerStore, LedgerTx, StoreError};

#[derive(Debug, Default, Clone)]
struct LedgerState {
    rows: HashMap<StockKey, StockRow>,
    /// Append-only, in ledger order.
    movements: Vec<Movement>,
    /// original movement -> its reversal
    reversals: HashMap<MovementId, MovementId>,
    /// Equipment types whose stock writes fail (fault injection for tests).
    failing_types: HashSet<EquipmentTypeId>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Not optimized for performance: a transaction holds
/// the single store lock for its whole lifetime (serialisable isolation) and
/// works on a copy of the state that replaces the shared state on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed movements, in ledger order.
    pub async fn movements(&self) -> Vec<Movement> {
        self.state.lock().await.movements.clone()
    }

    /// Committed row for a key.
    pub async fn row(&self, key: StockKey) -> Option<StockRow> {
        self.state.lock().await.rows.get(&key).cloned()
    }

    /// Overwrite a committed row's quantity without a movement.
    ///
    /// Only exists to exercise drift detection.
    #[cfg(test)]
    pub async fn tamper_quantity(&self, key: StockKey, quantity: i64) {
        if let Some(row) = self.state.lock().await.rows.get_mut(&key) {
            row.quantity = quantity;
        }
    }

    /// Make every later stock write for `equipment_type_id` fail.
    #[cfg(test)]
    pub async fn fail_writes_for(&self, equipment_type_id: EquipmentTypeId) {
        self.state.lock().await.failing_types.insert(equipment_type_id);
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Tx = InMemoryLedgerTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(InMemoryLedgerTx { guard, work })
    }
}

/// Unit of work over an [`InMemoryLedgerStore`].
#[derive(Debug)]
pub struct InMemoryLedgerTx {
    guard: OwnedMutexGuard<LedgerState>,
    work: LedgerState,
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn lock_stock(&mut self, key: StockKey) -> Result<StockRow, StoreError> {
        let row = self
            .work
            .rows
            .entry(key)
            .or_insert_with(|| StockRow::empty(key, Utc::now()));
        Ok(row.clone())
    }

    async fn find_stock(&mut self, key: StockKey) -> Result<Option<StockRow>, StoreError> {
        Ok(self.work.rows.get(&key).cloned())
    }

    async fn write_stock(&mut self, row: &StockRow) -> Result<(), StoreError> {
        if self.work.failing_types.contains(&row.key.equipment_type_id) {
            return Err(StoreError::Backend(format!(
                "injected write failure for equipment type {}",
                row.key.equipment_type_id
            )));
        }

        let stored = self
            .work
            .rows
            .get_mut(&row.key)
            .filter(|stored| stored.id == row.id)
            .ok_or_else(|| StoreError::NotFound(format!("stock row {}", row.id)))?;
        stored.quantity = row.quantity;
        stored.unit_cost = row.unit_cost;
        stored.updated_at = row.updated_at;
        Ok(())
    }

    async fn insert_movement(&mut self, movement: &Movement) -> Result<(), StoreError> {
        if let Some(original) = movement.reversal_of {
            if self.work.reversals.contains_key(&original) {
                return Err(StoreError::Conflict(format!(
                    "movement {original} already has a reversal"
                )));
            }
            self.work.reversals.insert(original, movement.id);
        }
        self.work.movements.push(movement.clone());
        Ok(())
    }

    async fn find_movement(&mut self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        Ok(self.work.movements.iter().find(|m| m.id == id).cloned())
    }

    async fn find_reversal_of(&mut self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        let Some(reversal_id) = self.work.reversals.get(&id).copied() else {
            return Ok(None);
        };
        self.find_movement(reversal_id).await
    }

    async fn latest_movement_for_row(
        &mut self,
        row_id: StockRowId,
    ) -> Result<Option<Movement>, StoreError> {
        Ok(self
            .work
            .movements
            .iter()
            .rev()
            .find(|m| m.stock_row_id == row_id)
            .cloned())
    }

    async fn movements_for_row(&mut self, row_id: StockRowId) -> Result<Vec<Movement>, StoreError> {
        Ok(self
            .work
            .movements
            .iter()
            .filter(|m| m.stock_row_id == row_id)
            .cloned()
            .collect())
    }

    async fn movements_by_source(&mut self, source: SourceRef) -> Result<Vec<Movement>, StoreError> {
        Ok(self
            .work
            .movements
            .iter()
            .filter(|m| m.source == Some(source))
            .cloned()
            .collect())
    }

    async fn stock_for_warehouse(
        &mut self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<StockRow>, StoreError> {
        let mut rows: Vec<_> = self
            .work
            .rows
            .values()
            .filter(|r| r.key.warehouse_id == warehouse_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.key);
        Ok(rows)
    }

    async fn all_stock(&mut self) -> Result<Vec<StockRow>, StoreError> {
        let mut rows: Vec<_> = self.work.rows.values().cloned().collect();
        rows.sort_by_key(|r| r.key);
        Ok(rows)
    }

    async fn commit(self) -> Result<(), StoreError> {
        let InMemoryLedgerTx { mut guard, work } = self;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epiledger_stock::{MovementType, NegativeStockPolicy, StockEffect, post};
    use epiledger_core::UserId;

    fn key() -> StockKey {
        StockKey::available(WarehouseId::new(), EquipmentTypeId::new())
    }

    #[tokio::test]
    async fn lock_stock_creates_once() {
        let store = InMemoryLedgerStore::new();
        let k = key();

        let mut tx = store.begin().await.unwrap();
        let first = tx.lock_stock(k).await.unwrap();
        let second = tx.lock_stock(k).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.quantity, 0);
        tx.commit().await.unwrap();

        assert_eq!(store.row(k).await.unwrap().id, first.id);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryLedgerStore::new();
        let k = key();

        {
            let mut tx = store.begin().await.unwrap();
            let mut row = tx.lock_stock(k).await.unwrap();
            row.quantity = 99;
            tx.write_stock(&row).await.unwrap();
        }

        assert!(store.row(k).await.is_none());
    }

    #[tokio::test]
    async fn second_reversal_of_the_same_movement_conflicts() {
        let store = InMemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        let row = tx.lock_stock(key()).await.unwrap();
        let posting = post(0, StockEffect::Increase, 3, NegativeStockPolicy::Forbid).unwrap();
        let original = Movement::from_posting(&row, MovementType::NoteEntry, &posting, UserId::new(), Utc::now());
        tx.insert_movement(&original).await.unwrap();

        let undo = post(3, StockEffect::Decrease, 3, NegativeStockPolicy::Forbid).unwrap();
        let reversal = Movement::from_posting(&row, MovementType::Reversal, &undo, UserId::new(), Utc::now())
            .reversing(original.id);
        tx.insert_movement(&reversal).await.unwrap();

        let again = Movement::from_posting(&row, MovementType::Reversal, &undo, UserId::new(), Utc::now())
            .reversing(original.id);
        assert!(matches!(tx.insert_movement(&again).await, Err(StoreError::Conflict(_))));
        assert_eq!(tx.find_reversal_of(original.id).await.unwrap().unwrap().id, reversal.id);
    }
}

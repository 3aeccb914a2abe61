//! Stock ledger engine (application-level orchestration).
//!
//! [`StockLedger`] is the only writer of stock balances. Every operation runs
//! inside one unit of work opened on the injected
//! [`LedgerStore`](crate::ledger_store::LedgerStore):
//!
//! ```text
//! request
//!   ↓
//! 1. validate input (pure, before any IO)
//!   ↓
//! 2. begin transaction, lock the affected stock rows
//!   ↓
//! 3. decide (pure functions from `epiledger-stock`)
//!   ↓
//! 4. write rows + append movements
//!   ↓
//! 5. commit (or drop the transaction: nothing is kept)
//! ```
//!
//! Rows are locked through `LedgerTx::lock_stock`, which serialises concurrent
//! operations on the same key. Operations touching several keys lock them in
//! key order so two of them can never wait on each other.
//!
//! Configuration (negative stock, forced adjustments, minimum threshold) is
//! read from the injected [`ConfigProvider`] at the start of each operation.

mod adjustment;
mod movements;
mod queries;
mod reconciliation;
mod reversal;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use epiledger_core::{EquipmentTypeId, MovementId, StockRowId, UserId, WarehouseId};
use epiledger_stock::{
    AdjustmentDecision, AdjustmentKind, CountedItem, Divergence, DivergenceSummary, ItemCondition,
    Movement, MovementType, NegativeStockPolicy, SourceRef, StockEffect, StockKey, StockRow,
    StockStatus, decide_adjustment, post,
};

use crate::config::ConfigProvider;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger_store::LedgerTx;

/// Stock ledger over a store `S`, configured by `C`.
#[derive(Debug, Clone)]
pub struct StockLedger<S, C> {
    store: S,
    config: C,
}

impl<S, C> StockLedger<S, C> {
    pub fn new(store: S, config: C) -> Self {
        Self { store, config }
    }
}

/// Record one movement of a natural type (anything but a reversal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub movement_type: MovementType,
    pub key: StockKey,
    pub quantity: i64,
    pub responsible_user_id: UserId,
    pub source: Option<SourceRef>,
    /// Replaces the row's unit cost when present (entries from notes).
    pub unit_cost: Option<i64>,
    pub reason: Option<String>,
}

impl RecordMovement {
    pub fn new(
        movement_type: MovementType,
        key: StockKey,
        quantity: i64,
        responsible_user_id: UserId,
    ) -> Self {
        Self {
            movement_type,
            key,
            quantity,
            responsible_user_id,
            source: None,
            unit_cost: None,
            reason: None,
        }
    }

    pub fn with_source(mut self, source: SourceRef) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: i64) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Move units between two warehouses (Available to Available).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
    pub equipment_type_id: EquipmentTypeId,
    pub quantity: i64,
    pub responsible_user_id: UserId,
    pub source: Option<SourceRef>,
}

/// The two legs of a transfer or an inspection release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub outbound: Movement,
    pub inbound: Movement,
}

/// Units coming back from a delivery, routed by their condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub warehouse_id: WarehouseId,
    pub equipment_type_id: EquipmentTypeId,
    pub quantity: i64,
    pub condition: ItemCondition,
    pub responsible_user_id: UserId,
    pub source: Option<SourceRef>,
}

/// Outcome of an inspection of returned units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionRelease {
    pub warehouse_id: WarehouseId,
    pub equipment_type_id: EquipmentTypeId,
    pub quantity: i64,
    /// Approved units go back to Available, rejected ones to Quarantine.
    pub approved: bool,
    pub responsible_user_id: UserId,
    pub source: Option<SourceRef>,
}

/// Set a row's balance to an exact quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectAdjustment {
    pub warehouse_id: WarehouseId,
    pub equipment_type_id: EquipmentTypeId,
    pub status: StockStatus,
    pub new_quantity: i64,
    pub reason: String,
    /// When set, the adjustment is refused unless forced adjustments are enabled.
    pub require_permission_check: bool,
    pub user_id: UserId,
}

impl DirectAdjustment {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.warehouse_id, self.equipment_type_id, self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentResult {
    pub key: StockKey,
    /// `None` when the row did not exist and the adjustment was neutral.
    pub stock_row_id: Option<StockRowId>,
    /// `None` for a neutral adjustment.
    pub movement_id: Option<MovementId>,
    #[serde(rename = "saldoAnterior")]
    pub balance_before: i64,
    #[serde(rename = "saldoPosterior")]
    pub balance_after: i64,
    pub difference: i64,
    pub kind: AdjustmentKind,
    pub below_minimum: bool,
}

/// Preview of a direct adjustment. Nothing is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub key: StockKey,
    pub current_balance: i64,
    pub new_quantity: i64,
    pub difference: i64,
    pub kind: AdjustmentKind,
    pub unit_cost: Option<i64>,
    pub estimated_impact: Option<i64>,
}

/// A physical count of one warehouse's Available stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCount {
    pub warehouse_id: WarehouseId,
    pub items: Vec<CountedItem>,
    /// Fallback reason for items that carry none.
    pub observations: Option<String>,
    pub user_id: UserId,
    /// Identifier of the count document; generated when absent.
    pub count_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedAdjustment {
    pub equipment_type_id: EquipmentTypeId,
    pub movement_id: MovementId,
    pub movement_type: MovementType,
    pub balance_before: i64,
    pub balance_after: i64,
    pub difference: i64,
    pub estimated_impact: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryResult {
    /// Source id every movement of this count is linked to.
    pub count_id: Uuid,
    pub adjustments: Vec<AppliedAdjustment>,
    pub positive_adjustments: usize,
    pub negative_adjustments: usize,
    pub unchanged_items: usize,
    /// Sum of the known per-item impacts (minor currency units).
    pub estimated_financial_impact: i64,
}

/// Read-only comparison of a count against the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceReport {
    pub warehouse_id: WarehouseId,
    pub items: Vec<Divergence>,
    pub summary: DivergenceSummary,
}

/// Configuration snapshot taken at the start of an operation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LedgerPolicy {
    pub negative_stock: NegativeStockPolicy,
    pub minimum_stock: i64,
}

impl LedgerPolicy {
    pub(crate) async fn load<C: ConfigProvider>(config: &C) -> Self {
        Self {
            negative_stock: NegativeStockPolicy::from_flag(config.allow_negative_stock().await),
            minimum_stock: config.minimum_stock_threshold().await,
        }
    }

    pub(crate) fn is_below_minimum(&self, balance: i64) -> bool {
        balance < self.minimum_stock
    }
}

/// One ledger line to post inside an open transaction.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub key: StockKey,
    pub movement_type: MovementType,
    pub effect: StockEffect,
    pub quantity: i64,
    pub responsible_user_id: UserId,
    pub source: Option<SourceRef>,
    pub unit_cost: Option<i64>,
    pub reason: Option<String>,
    pub reversal_of: Option<MovementId>,
}

impl Entry {
    pub(crate) fn natural(
        movement_type: MovementType,
        effect: StockEffect,
        key: StockKey,
        quantity: i64,
        responsible_user_id: UserId,
    ) -> Self {
        Self {
            key,
            movement_type,
            effect,
            quantity,
            responsible_user_id,
            source: None,
            unit_cost: None,
            reason: None,
            reversal_of: None,
        }
    }
}

/// Lock the row, compute the posting, write the row and append the movement.
///
/// Returns the updated row and the appended movement. Nothing is visible
/// until the caller commits `tx`.
pub(crate) async fn post_entry<T: LedgerTx>(
    tx: &mut T,
    entry: Entry,
    policy: LedgerPolicy,
) -> LedgerResult<(StockRow, Movement)> {
    let mut row = tx.lock_stock(entry.key).await?;
    let posting = post(row.quantity, entry.effect, entry.quantity, policy.negative_stock)?;

    let now = Utc::now();
    row.quantity = posting.balance_after;
    if entry.unit_cost.is_some() {
        row.unit_cost = entry.unit_cost;
    }
    row.updated_at = now;
    tx.write_stock(&row).await?;

    let mut movement = Movement::from_posting(
        &row,
        entry.movement_type,
        &posting,
        entry.responsible_user_id,
        now,
    )
    .with_source(entry.source)
    .with_reason(entry.reason);
    if let Some(original) = entry.reversal_of {
        movement = movement.reversing(original);
    }
    tx.insert_movement(&movement).await?;

    if policy.is_below_minimum(row.quantity) {
        warn!(
            key = %row.key,
            balance = row.quantity,
            minimum = policy.minimum_stock,
            "stock below minimum threshold"
        );
    }

    Ok((row, movement))
}

/// Outcome of [`adjust_in_tx`].
pub(crate) struct Adjusted {
    pub row: Option<StockRow>,
    pub decision: AdjustmentDecision,
    pub movement: Option<Movement>,
}

/// Bring the row for `key` to `target` inside an open transaction.
///
/// A missing row counted as zero stays missing; every other case locks (and
/// if needed creates) the row before deciding.
pub(crate) async fn adjust_in_tx<T: LedgerTx>(
    tx: &mut T,
    key: StockKey,
    target: i64,
    reason: String,
    responsible_user_id: UserId,
    source: Option<SourceRef>,
    policy: LedgerPolicy,
) -> LedgerResult<Adjusted> {
    let exists = tx.find_stock(key).await?.is_some();
    if !exists && target == 0 {
        let decision = decide_adjustment(0, 0, policy.negative_stock)?;
        return Ok(Adjusted {
            row: None,
            decision,
            movement: None,
        });
    }

    let row = tx.lock_stock(key).await?;
    let decision = decide_adjustment(row.quantity, target, policy.negative_stock)?;

    let Some((movement_type, quantity)) = decision.movement() else {
        return Ok(Adjusted {
            row: Some(row),
            decision,
            movement: None,
        });
    };

    let Some(effect) = movement_type.natural_effect() else {
        return Err(LedgerError::business(format!(
            "{movement_type} has no natural stock effect"
        )));
    };
    let mut entry = Entry::natural(movement_type, effect, key, quantity, responsible_user_id);
    entry.source = source;
    entry.reason = Some(reason);

    let (row, movement) = post_entry(tx, entry, policy).await?;
    Ok(Adjusted {
        row: Some(row),
        decision,
        movement: Some(movement),
    })
}

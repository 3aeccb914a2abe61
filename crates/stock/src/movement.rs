use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use epiledger_core::{DomainError, MovementId, StockRowId, UserId};

use crate::posting::Posting;
use crate::row::{StockKey, StockRow};

/// Direction in which a movement changes its target row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockEffect {
    Increase,
    Decrease,
}

impl StockEffect {
    pub fn inverse(self) -> Self {
        match self {
            StockEffect::Increase => StockEffect::Decrease,
            StockEffect::Decrease => StockEffect::Increase,
        }
    }

    /// Signed contribution of `quantity` to a balance.
    pub fn signed(self, quantity: i64) -> i64 {
        match self {
            StockEffect::Increase => quantity,
            StockEffect::Decrease => -quantity,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            StockEffect::Increase => "ENTRADA",
            StockEffect::Decrease => "SAIDA",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, DomainError> {
        match code {
            "ENTRADA" => Ok(StockEffect::Increase),
            "SAIDA" => Ok(StockEffect::Decrease),
            other => Err(DomainError::validation(format!("unknown stock effect: {other}"))),
        }
    }
}

/// Kind of stock-affecting event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Entry from a completed receiving note.
    NoteEntry,
    /// Exit to an employee delivery.
    DeliveryExit,
    /// Source side of a transfer.
    TransferOut,
    /// Destination side of a transfer.
    TransferIn,
    /// Exit to discard.
    DiscardExit,
    /// Entry of an item returned from a delivery.
    ReturnEntry,
    PositiveAdjustment,
    NegativeAdjustment,
    /// Estorno: inverse of another movement.
    Reversal,
}

impl MovementType {
    pub const ALL: [MovementType; 9] = [
        MovementType::NoteEntry,
        MovementType::DeliveryExit,
        MovementType::TransferOut,
        MovementType::TransferIn,
        MovementType::DiscardExit,
        MovementType::ReturnEntry,
        MovementType::PositiveAdjustment,
        MovementType::NegativeAdjustment,
        MovementType::Reversal,
    ];

    /// Effect on the target row.
    ///
    /// `None` for reversals: their direction depends on the movement they undo.
    pub fn natural_effect(self) -> Option<StockEffect> {
        match self {
            MovementType::NoteEntry
            | MovementType::TransferIn
            | MovementType::ReturnEntry
            | MovementType::PositiveAdjustment => Some(StockEffect::Increase),
            MovementType::DeliveryExit
            | MovementType::TransferOut
            | MovementType::DiscardExit
            | MovementType::NegativeAdjustment => Some(StockEffect::Decrease),
            MovementType::Reversal => None,
        }
    }

    pub fn is_adjustment(self) -> bool {
        matches!(self, MovementType::PositiveAdjustment | MovementType::NegativeAdjustment)
    }

    /// Stable storage code.
    pub fn code(self) -> &'static str {
        match self {
            MovementType::NoteEntry => "ENTRADA_NOTA",
            MovementType::DeliveryExit => "SAIDA_ENTREGA",
            MovementType::TransferOut => "SAIDA_TRANSFERENCIA",
            MovementType::TransferIn => "ENTRADA_TRANSFERENCIA",
            MovementType::DiscardExit => "SAIDA_DESCARTE",
            MovementType::ReturnEntry => "ENTRADA_DEVOLUCAO",
            MovementType::PositiveAdjustment => "AJUSTE_POSITIVO",
            MovementType::NegativeAdjustment => "AJUSTE_NEGATIVO",
            MovementType::Reversal => "ESTORNO",
        }
    }

    /// Parse a storage code. Unknown codes are reported verbatim so callers
    /// can name them.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Kind of business document that caused a movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    EntryNote,
    Delivery,
    Return,
    Transfer,
    Discard,
    InventoryCount,
    Inspection,
}

impl SourceKind {
    pub fn code(self) -> &'static str {
        match self {
            SourceKind::EntryNote => "NOTA",
            SourceKind::Delivery => "ENTREGA",
            SourceKind::Return => "DEVOLUCAO",
            SourceKind::Transfer => "TRANSFERENCIA",
            SourceKind::Discard => "DESCARTE",
            SourceKind::InventoryCount => "INVENTARIO",
            SourceKind::Inspection => "INSPECAO",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, DomainError> {
        [
            SourceKind::EntryNote,
            SourceKind::Delivery,
            SourceKind::Return,
            SourceKind::Transfer,
            SourceKind::Discard,
            SourceKind::InventoryCount,
            SourceKind::Inspection,
        ]
        .into_iter()
        .find(|k| k.code() == code)
        .ok_or_else(|| DomainError::validation(format!("unknown source kind: {code}")))
    }
}

/// Link from a movement to its source document.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: SourceKind,
    pub id: Uuid,
}

impl SourceRef {
    pub fn new(kind: SourceKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

/// Immutable ledger entry for one stock-affecting event.
///
/// Invariant: `balance_after = balance_before + effect.signed(quantity)` and
/// `quantity > 0`. Reversals are additional movements linked through
/// `reversal_of`, never edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub stock_row_id: StockRowId,
    pub key: StockKey,
    pub movement_type: MovementType,
    pub effect: StockEffect,
    pub quantity: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub responsible_user_id: UserId,
    pub occurred_at: DateTime<Utc>,
    pub source: Option<SourceRef>,
    pub reversal_of: Option<MovementId>,
    pub reason: Option<String>,
}

impl Movement {
    /// Build the ledger entry for a posting against `row`.
    pub fn from_posting(
        row: &StockRow,
        movement_type: MovementType,
        posting: &Posting,
        responsible_user_id: UserId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            stock_row_id: row.id,
            key: row.key,
            movement_type,
            effect: posting.effect,
            quantity: posting.quantity,
            balance_before: posting.balance_before,
            balance_after: posting.balance_after,
            responsible_user_id,
            occurred_at,
            source: None,
            reversal_of: None,
            reason: None,
        }
    }

    pub fn with_source(mut self, source: Option<SourceRef>) -> Self {
        self.source = source;
        self
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn reversing(mut self, original: MovementId) -> Self {
        self.reversal_of = Some(original);
        self
    }

    pub fn signed_quantity(&self) -> i64 {
        self.effect.signed(self.quantity)
    }

    pub fn is_reversal(&self) -> bool {
        self.movement_type == MovementType::Reversal || self.reversal_of.is_some()
    }

    /// Check the before/after invariant.
    pub fn is_balanced(&self) -> bool {
        self.quantity > 0
            && self
                .balance_before
                .checked_add(self.signed_quantity())
                .is_some_and(|after| after == self.balance_after)
    }
}

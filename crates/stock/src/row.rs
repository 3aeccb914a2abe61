use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use epiledger_core::{EquipmentTypeId, StockRowId, WarehouseId};

use crate::status::StockStatus;

/// Address of a stock row: at most one row exists per key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub warehouse_id: WarehouseId,
    pub equipment_type_id: EquipmentTypeId,
    pub status: StockStatus,
}

impl StockKey {
    pub fn new(
        warehouse_id: WarehouseId,
        equipment_type_id: EquipmentTypeId,
        status: StockStatus,
    ) -> Self {
        Self {
            warehouse_id,
            equipment_type_id,
            status,
        }
    }

    pub fn available(warehouse_id: WarehouseId, equipment_type_id: EquipmentTypeId) -> Self {
        Self::new(warehouse_id, equipment_type_id, StockStatus::Available)
    }

    /// Same warehouse and equipment type, different status.
    pub fn with_status(self, status: StockStatus) -> Self {
        Self { status, ..self }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}/{}", self.warehouse_id, self.equipment_type_id, self.status)
    }
}

/// Quantity of one equipment type, in one warehouse, in one status.
///
/// Rows are created on the first movement that references their key and are
/// never deleted; the quantity may reach zero (or go below it when the
/// negative-stock policy allows).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRow {
    pub id: StockRowId,
    pub key: StockKey,
    pub quantity: i64,
    /// Last known unit cost in minor currency units.
    pub unit_cost: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockRow {
    /// Zero-balance row for a key seen for the first time.
    pub fn empty(key: StockKey, now: DateTime<Utc>) -> Self {
        Self {
            id: StockRowId::new(),
            key,
            quantity: 0,
            unit_cost: None,
            created_at: now,
            updated_at: now,
        }
    }
}

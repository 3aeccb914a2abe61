use serde::{Deserialize, Serialize};

use epiledger_core::DomainError;

/// Physical/administrative status of a stock row.
///
/// `Available` is where stock normally lives. `Quarantine` holds items pending
/// a disposal decision and `AwaitingInspection` holds returned items whose
/// condition still has to be checked. Moving quantity between statuses always
/// goes through a ledger movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StockStatus {
    #[serde(rename = "DISPONIVEL")]
    Available,
    #[serde(rename = "AGUARDANDO_INSPECAO")]
    AwaitingInspection,
    #[serde(rename = "QUARENTENA")]
    Quarantine,
}

impl StockStatus {
    pub const ALL: [StockStatus; 3] = [
        StockStatus::Available,
        StockStatus::AwaitingInspection,
        StockStatus::Quarantine,
    ];

    /// Stable storage code.
    pub fn code(self) -> &'static str {
        match self {
            StockStatus::Available => "DISPONIVEL",
            StockStatus::AwaitingInspection => "AGUARDANDO_INSPECAO",
            StockStatus::Quarantine => "QUARENTENA",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, DomainError> {
        Self::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or_else(|| DomainError::validation(format!("unknown stock status: {code}")))
    }
}

impl core::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Condition of an item coming back from a delivery.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    /// Reusable as-is.
    Good,
    /// Needs an inspection before it can be handed out again.
    Damaged,
    /// Cannot be reused; waits for a disposal decision.
    Unusable,
}

impl ItemCondition {
    /// Status row that receives a return in this condition.
    pub fn target_status(self) -> StockStatus {
        match self {
            ItemCondition::Good => StockStatus::Available,
            ItemCondition::Damaged => StockStatus::AwaitingInspection,
            ItemCondition::Unusable => StockStatus::Quarantine,
        }
    }
}

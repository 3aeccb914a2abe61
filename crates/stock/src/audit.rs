//! Ledger replay: detect a stored balance that drifted from its movements.

use serde::{Deserialize, Serialize};

use epiledger_core::MovementId;

use crate::movement::Movement;
use crate::row::{StockKey, StockRow};

/// Result of replaying a row's movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAudit {
    pub key: StockKey,
    pub stored_balance: i64,
    /// Sum of signed movement quantities, starting from zero.
    pub ledger_balance: i64,
    pub movement_count: usize,
    /// Movements whose `balance_before` does not continue the previous
    /// movement's `balance_after`, or whose own before/after disagree.
    pub broken_links: Vec<MovementId>,
}

impl BalanceAudit {
    pub fn is_consistent(&self) -> bool {
        self.stored_balance == self.ledger_balance && self.broken_links.is_empty()
    }

    pub fn drift(&self) -> i64 {
        self.stored_balance.saturating_sub(self.ledger_balance)
    }
}

/// Replay `movements` (in ledger order) against `row`.
pub fn audit_chain(row: &StockRow, movements: &[Movement]) -> BalanceAudit {
    let mut running = 0i64;
    let mut broken_links = Vec::new();

    for movement in movements {
        if movement.balance_before != running || !movement.is_balanced() {
            broken_links.push(movement.id);
        }
        running = running.saturating_add(movement.signed_quantity());
    }

    BalanceAudit {
        key: row.key,
        stored_balance: row.quantity,
        ledger_balance: running,
        movement_count: movements.len(),
        broken_links,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::{MovementType, StockEffect};
    use crate::posting::{NegativeStockPolicy, post};
    use chrono::Utc;
    use epiledger_core::{EquipmentTypeId, UserId, WarehouseId};

    fn replay(steps: &[(MovementType, i64)]) -> (StockRow, Vec<Movement>) {
        let key = StockKey::available(WarehouseId::new(), EquipmentTypeId::new());
        let mut row = StockRow::empty(key, Utc::now());
        let mut movements = Vec::new();
        for (movement_type, quantity) in steps {
            let effect = movement_type.natural_effect().unwrap_or(StockEffect::Increase);
            let posting = post(row.quantity, effect, *quantity, NegativeStockPolicy::Forbid).unwrap();
            movements.push(Movement::from_posting(&row, *movement_type, &posting, UserId::new(), Utc::now()));
            row.quantity = posting.balance_after;
        }
        (row, movements)
    }

    #[test]
    fn clean_history_is_consistent() {
        let (row, movements) = replay(&[
            (MovementType::NoteEntry, 50),
            (MovementType::DeliveryExit, 10),
            (MovementType::NegativeAdjustment, 5),
        ]);
        let audit = audit_chain(&row, &movements);
        assert!(audit.is_consistent());
        assert_eq!(audit.ledger_balance, 35);
        assert_eq!(audit.movement_count, 3);
    }

    #[test]
    fn direct_row_edit_shows_up_as_drift() {
        let (mut row, movements) = replay(&[(MovementType::NoteEntry, 50)]);
        row.quantity = 47;
        let audit = audit_chain(&row, &movements);
        assert!(!audit.is_consistent());
        assert_eq!(audit.drift(), -3);
    }

    #[test]
    fn broken_chain_is_reported() {
        let (row, mut movements) = replay(&[
            (MovementType::NoteEntry, 50),
            (MovementType::DeliveryExit, 10),
        ]);
        movements[1].balance_before = 45;
        let audit = audit_chain(&row, &movements);
        assert_eq!(audit.broken_links, vec![movements[1].id]);
    }
}

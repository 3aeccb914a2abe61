//! Estorno planning: what a reversal does to which row.
//!
//! The inverse of a movement is usually "same row, opposite direction, same
//! quantity", with three exceptions:
//!
//! - an entry from a note is always taken back out of `AVAILABLE`;
//! - a discard is always put back into `AVAILABLE`;
//! - an adjustment restores the row to the balance it had before the
//!   adjustment instead of applying a relative delta.

use serde::{Deserialize, Serialize};

use epiledger_core::{DomainError, DomainResult};

use crate::adjustment::quantity_difference;
use crate::movement::{Movement, MovementType, StockEffect};
use crate::row::StockKey;
use crate::status::StockStatus;

/// How the reversal moves its target row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReversalTarget {
    /// Move `quantity` in direction `effect`.
    Relative { effect: StockEffect, quantity: i64 },
    /// Bring the row back to exactly `balance`.
    Restore { balance: i64 },
}

/// Inverse stock operation for one movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalPlan {
    pub key: StockKey,
    pub target: ReversalTarget,
}

impl ReversalPlan {
    /// Absolute restores are only sound while nothing else touched the row.
    pub fn requires_untouched_row(&self) -> bool {
        matches!(self.target, ReversalTarget::Restore { .. })
    }

    /// Direction and magnitude to apply given the row's current balance.
    pub fn resolve(&self, current: i64) -> DomainResult<(StockEffect, i64)> {
        match self.target {
            ReversalTarget::Relative { effect, quantity } => Ok((effect, quantity)),
            ReversalTarget::Restore { balance } => {
                let delta = quantity_difference(current, balance)?;
                if delta == 0 {
                    return Err(DomainError::business(
                        "row is already at its pre-adjustment balance; nothing to reverse",
                    ));
                }
                let effect = if delta > 0 {
                    StockEffect::Increase
                } else {
                    StockEffect::Decrease
                };
                Ok((effect, delta.abs()))
            }
        }
    }
}

/// Work out the inverse of `original`.
///
/// Fails when `original` is itself a reversal. Whether `original` has already
/// been reversed is a storage question and is checked by the caller.
pub fn plan_reversal(original: &Movement) -> DomainResult<ReversalPlan> {
    if original.is_reversal() {
        return Err(DomainError::business(format!(
            "movement {} is itself a reversal and cannot be reversed",
            original.id
        )));
    }

    let plan = match original.movement_type {
        MovementType::NoteEntry => ReversalPlan {
            key: original.key.with_status(StockStatus::Available),
            target: ReversalTarget::Relative {
                effect: StockEffect::Decrease,
                quantity: original.quantity,
            },
        },
        MovementType::DiscardExit => ReversalPlan {
            key: original.key.with_status(StockStatus::Available),
            target: ReversalTarget::Relative {
                effect: StockEffect::Increase,
                quantity: original.quantity,
            },
        },
        MovementType::PositiveAdjustment | MovementType::NegativeAdjustment => ReversalPlan {
            key: original.key,
            target: ReversalTarget::Restore {
                balance: original.balance_before,
            },
        },
        _ => ReversalPlan {
            key: original.key,
            target: ReversalTarget::Relative {
                effect: original.effect.inverse(),
                quantity: original.quantity,
            },
        },
    };

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::{NegativeStockPolicy, post};
    use crate::row::StockRow;
    use chrono::Utc;
    use epiledger_core::{EquipmentTypeId, MovementId, UserId, WarehouseId};
    use proptest::prelude::*;

    fn movement_on(
        status: StockStatus,
        movement_type: MovementType,
        before: i64,
        quantity: i64,
    ) -> Movement {
        let key = StockKey::new(WarehouseId::new(), EquipmentTypeId::new(), status);
        let row = StockRow {
            quantity: before,
            ..StockRow::empty(key, Utc::now())
        };
        let effect = movement_type.natural_effect().unwrap();
        let posting = post(before, effect, quantity, NegativeStockPolicy::Allow).unwrap();
        Movement::from_posting(&row, movement_type, &posting, UserId::new(), Utc::now())
    }

    #[test]
    fn note_entry_is_taken_out_of_available() {
        let original = movement_on(StockStatus::Quarantine, MovementType::NoteEntry, 0, 8);
        let plan = plan_reversal(&original).unwrap();
        assert_eq!(plan.key.status, StockStatus::Available);
        assert_eq!(plan.key.warehouse_id, original.key.warehouse_id);
        assert_eq!(
            plan.target,
            ReversalTarget::Relative { effect: StockEffect::Decrease, quantity: 8 }
        );
    }

    #[test]
    fn discard_goes_back_to_available() {
        let original = movement_on(StockStatus::Quarantine, MovementType::DiscardExit, 5, 2);
        let plan = plan_reversal(&original).unwrap();
        assert_eq!(plan.key.status, StockStatus::Available);
        assert_eq!(
            plan.target,
            ReversalTarget::Relative { effect: StockEffect::Increase, quantity: 2 }
        );
    }

    #[test]
    fn adjustments_restore_the_previous_balance() {
        let original = movement_on(StockStatus::Available, MovementType::NegativeAdjustment, 40, 5);
        let plan = plan_reversal(&original).unwrap();
        assert!(plan.requires_untouched_row());
        assert_eq!(plan.target, ReversalTarget::Restore { balance: 40 });
        assert_eq!(plan.resolve(35).unwrap(), (StockEffect::Increase, 5));
    }

    #[test]
    fn transfer_sides_invert() {
        let out = movement_on(StockStatus::Available, MovementType::TransferOut, 10, 4);
        let plan = plan_reversal(&out).unwrap();
        assert_eq!(plan.resolve(6).unwrap(), (StockEffect::Increase, 4));

        let inbound = movement_on(StockStatus::Available, MovementType::TransferIn, 0, 4);
        let plan = plan_reversal(&inbound).unwrap();
        assert_eq!(plan.resolve(4).unwrap(), (StockEffect::Decrease, 4));
    }

    #[test]
    fn reversals_cannot_be_reversed() {
        let mut estorno = movement_on(StockStatus::Available, MovementType::DeliveryExit, 10, 1);
        estorno.movement_type = MovementType::Reversal;
        estorno.reversal_of = Some(MovementId::new());

        let err = plan_reversal(&estorno).unwrap_err();
        assert!(matches!(err, DomainError::BusinessRule(msg) if msg.contains("itself a reversal")));
    }

    #[test]
    fn restore_with_no_delta_is_rejected() {
        let plan = ReversalPlan {
            key: StockKey::available(WarehouseId::new(), EquipmentTypeId::new()),
            target: ReversalTarget::Restore { balance: 12 },
        };
        assert!(matches!(plan.resolve(12), Err(DomainError::BusinessRule(_))));
    }

    #[test]
    fn restore_beyond_a_movement_quantity_is_rejected() {
        let plan = ReversalPlan {
            key: StockKey::available(WarehouseId::new(), EquipmentTypeId::new()),
            target: ReversalTarget::Restore { balance: -1 },
        };
        assert!(matches!(plan.resolve(i64::MAX), Err(DomainError::Validation(_))));
    }

    fn reversible_type() -> impl Strategy<Value = MovementType> {
        prop::sample::select(vec![
            MovementType::NoteEntry,
            MovementType::DeliveryExit,
            MovementType::TransferOut,
            MovementType::TransferIn,
            MovementType::DiscardExit,
            MovementType::ReturnEntry,
            MovementType::PositiveAdjustment,
            MovementType::NegativeAdjustment,
        ])
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: on an AVAILABLE row with no intervening movement, posting a
        /// movement and then its reversal restores the original balance.
        #[test]
        fn reversal_round_trip_on_available(
            movement_type in reversible_type(),
            before in -1_000i64..1_000,
            quantity in 1i64..500,
        ) {
            let original = movement_on(StockStatus::Available, movement_type, before, quantity);
            let plan = plan_reversal(&original).unwrap();
            prop_assert_eq!(plan.key, original.key);

            let (effect, magnitude) = plan.resolve(original.balance_after).unwrap();
            let undo = post(original.balance_after, effect, magnitude, NegativeStockPolicy::Allow).unwrap();
            prop_assert_eq!(undo.balance_after, before);
        }
    }
}

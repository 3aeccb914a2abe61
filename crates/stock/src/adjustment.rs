//! Classification of forced adjustments (set a row to an explicit quantity).

use serde::{Deserialize, Serialize};

use epiledger_core::{DomainError, DomainResult};

use crate::movement::MovementType;
use crate::posting::NegativeStockPolicy;

/// Sign of an adjustment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjustmentKind {
    #[serde(rename = "positivo")]
    Positive,
    #[serde(rename = "negativo")]
    Negative,
    #[serde(rename = "neutro")]
    Neutral,
}

impl AdjustmentKind {
    pub fn of(difference: i64) -> Self {
        match difference.signum() {
            1 => AdjustmentKind::Positive,
            -1 => AdjustmentKind::Negative,
            _ => AdjustmentKind::Neutral,
        }
    }
}

/// Outcome of comparing a row's balance with a target quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentDecision {
    pub current: i64,
    pub target: i64,
    /// `target - current`.
    pub difference: i64,
    pub kind: AdjustmentKind,
}

impl AdjustmentDecision {
    /// Movement to record, if any. Zero differences record nothing.
    pub fn movement(&self) -> Option<(MovementType, i64)> {
        match self.kind {
            AdjustmentKind::Positive => Some((MovementType::PositiveAdjustment, self.difference)),
            AdjustmentKind::Negative => self
                .difference
                .checked_neg()
                .map(|quantity| (MovementType::NegativeAdjustment, quantity)),
            AdjustmentKind::Neutral => None,
        }
    }
}

/// `target - current`, as long as its magnitude fits a movement quantity.
pub fn quantity_difference(current: i64, target: i64) -> DomainResult<i64> {
    target
        .checked_sub(current)
        .filter(|difference| difference.checked_neg().is_some())
        .ok_or_else(|| {
            DomainError::validation(format!(
                "difference between {current} and {target} is out of range"
            ))
        })
}

/// Decide how to move a row from `current` to `target`.
pub fn decide_adjustment(
    current: i64,
    target: i64,
    policy: NegativeStockPolicy,
) -> DomainResult<AdjustmentDecision> {
    if target < 0 && !policy.allows_negative() {
        return Err(DomainError::validation(format!(
            "new quantity must not be negative (got {target})"
        )));
    }

    let difference = quantity_difference(current, target)?;

    Ok(AdjustmentDecision {
        current,
        target,
        difference,
        kind: AdjustmentKind::of(difference),
    })
}

/// Adjustments must say why they happened.
pub fn require_reason(reason: &str) -> DomainResult<String> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("reason is required"));
    }
    Ok(trimmed.to_string())
}

/// Financial effect of a quantity difference, when the unit cost is known.
pub fn estimated_impact(difference: i64, unit_cost: Option<i64>) -> Option<i64> {
    unit_cost.and_then(|cost| difference.checked_mul(cost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_difference_records_nothing() {
        let d = decide_adjustment(10, 10, NegativeStockPolicy::Forbid).unwrap();
        assert_eq!(d.kind, AdjustmentKind::Neutral);
        assert_eq!(d.movement(), None);
    }

    #[test]
    fn negative_target_needs_the_policy() {
        let err = decide_adjustment(10, -1, NegativeStockPolicy::Forbid).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let d = decide_adjustment(10, -1, NegativeStockPolicy::Allow).unwrap();
        assert_eq!(d.movement(), Some((MovementType::NegativeAdjustment, 11)));
    }

    #[test]
    fn differences_beyond_a_movement_quantity_are_rejected() {
        let err = decide_adjustment(i64::MAX, -1, NegativeStockPolicy::Allow).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = decide_adjustment(i64::MIN, 1, NegativeStockPolicy::Allow).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let d = decide_adjustment(i64::MAX, 0, NegativeStockPolicy::Allow).unwrap();
        assert_eq!(d.movement(), Some((MovementType::NegativeAdjustment, i64::MAX)));
    }

    #[test]
    fn blank_reasons_are_rejected() {
        assert!(require_reason("   ").is_err());
        assert_eq!(require_reason("  recount ").unwrap(), "recount");
    }

    #[test]
    fn impact_needs_a_unit_cost() {
        assert_eq!(estimated_impact(-5, Some(1_250)), Some(-6_250));
        assert_eq!(estimated_impact(-5, None), None);
    }

    #[test]
    fn kinds_serialize_in_portuguese() {
        assert_eq!(serde_json::to_string(&AdjustmentKind::Neutral).unwrap(), "\"neutro\"");
    }

    proptest! {
        /// Property: the adjustment movement carries exactly the distance to the
        /// target, in the right direction.
        #[test]
        fn movement_matches_the_sign_of_the_difference(
            current in 0i64..10_000,
            target in 0i64..10_000,
        ) {
            let d = decide_adjustment(current, target, NegativeStockPolicy::Forbid).unwrap();
            match d.movement() {
                Some((MovementType::PositiveAdjustment, q)) => {
                    prop_assert!(target > current);
                    prop_assert_eq!(q, target - current);
                }
                Some((MovementType::NegativeAdjustment, q)) => {
                    prop_assert!(target < current);
                    prop_assert_eq!(q, current - target);
                }
                Some(other) => prop_assert!(false, "unexpected movement {:?}", other),
                None => prop_assert_eq!(target, current),
            }
        }
    }
}

//! Balance arithmetic for a single movement.

use serde::{Deserialize, Serialize};

use epiledger_core::{DomainError, DomainResult};

use crate::movement::StockEffect;

/// Whether a decrease may take a row below zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NegativeStockPolicy {
    #[default]
    Forbid,
    Allow,
}

impl NegativeStockPolicy {
    pub fn from_flag(allow_negative_stock: bool) -> Self {
        if allow_negative_stock {
            NegativeStockPolicy::Allow
        } else {
            NegativeStockPolicy::Forbid
        }
    }

    pub fn allows_negative(self) -> bool {
        self == NegativeStockPolicy::Allow
    }
}

/// Before/after balances of one movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub effect: StockEffect,
    pub quantity: i64,
    pub balance_before: i64,
    pub balance_after: i64,
}

/// Compute the new balance of a row holding `current` after moving `quantity`
/// in direction `effect`.
pub fn post(
    current: i64,
    effect: StockEffect,
    quantity: i64,
    policy: NegativeStockPolicy,
) -> DomainResult<Posting> {
    if quantity <= 0 {
        return Err(DomainError::validation(format!(
            "quantity must be positive (got {quantity})"
        )));
    }

    let balance_after = current
        .checked_add(effect.signed(quantity))
        .ok_or_else(|| DomainError::validation("quantity overflows the stock balance"))?;

    if effect == StockEffect::Decrease && balance_after < 0 && !policy.allows_negative() {
        return Err(DomainError::business(format!(
            "insufficient stock: balance {current}, requested {quantity}"
        )));
    }

    Ok(Posting {
        effect,
        quantity,
        balance_before: current,
        balance_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn increase_and_decrease_move_the_balance() {
        let p = post(10, StockEffect::Increase, 5, NegativeStockPolicy::Forbid).unwrap();
        assert_eq!((p.balance_before, p.balance_after), (10, 15));

        let p = post(10, StockEffect::Decrease, 10, NegativeStockPolicy::Forbid).unwrap();
        assert_eq!(p.balance_after, 0);
    }

    #[test]
    fn non_positive_quantity_is_a_validation_error() {
        for q in [0, -3] {
            let err = post(10, StockEffect::Increase, q, NegativeStockPolicy::Allow).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn negative_balance_depends_on_policy() {
        let err = post(3, StockEffect::Decrease, 5, NegativeStockPolicy::Forbid).unwrap_err();
        assert!(matches!(err, DomainError::BusinessRule(msg) if msg.contains("insufficient stock")));

        let p = post(3, StockEffect::Decrease, 5, NegativeStockPolicy::Allow).unwrap();
        assert_eq!(p.balance_after, -2);
    }

    #[test]
    fn increases_on_a_negative_row_are_always_accepted() {
        let p = post(-4, StockEffect::Increase, 1, NegativeStockPolicy::Forbid).unwrap();
        assert_eq!(p.balance_after, -3);
    }

    #[test]
    fn overflow_is_rejected() {
        assert!(post(i64::MAX, StockEffect::Increase, 1, NegativeStockPolicy::Allow).is_err());
    }

    fn effect_strategy() -> impl Strategy<Value = StockEffect> {
        prop_oneof![Just(StockEffect::Increase), Just(StockEffect::Decrease)]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the balance after any accepted sequence equals the sum of
        /// the signed quantities, and every posting chains onto the previous one.
        #[test]
        fn balance_is_the_sum_of_signed_quantities(
            steps in prop::collection::vec((effect_strategy(), 1i64..1_000), 1..50)
        ) {
            let mut balance = 0i64;
            let mut signed_sum = 0i64;

            for (effect, quantity) in steps {
                let posting = post(balance, effect, quantity, NegativeStockPolicy::Allow).unwrap();
                prop_assert_eq!(posting.balance_before, balance);
                balance = posting.balance_after;
                signed_sum += effect.signed(quantity);
            }

            prop_assert_eq!(balance, signed_sum);
        }

        /// Property: with negative stock forbidden, accepted postings never
        /// leave a balance below zero.
        #[test]
        fn forbid_policy_never_goes_negative(
            steps in prop::collection::vec((effect_strategy(), 1i64..100), 1..50)
        ) {
            let mut balance = 0i64;
            for (effect, quantity) in steps {
                if let Ok(posting) = post(balance, effect, quantity, NegativeStockPolicy::Forbid) {
                    balance = posting.balance_after;
                }
                prop_assert!(balance >= 0);
            }
        }
    }
}

use tracing::{info, instrument};

use epiledger_core::{MovementId, UserId};
use epiledger_stock::{Movement, MovementType, plan_reversal, require_reason};

use crate::config::ConfigProvider;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger_store::{LedgerStore, LedgerTx};

use super::{Entry, LedgerPolicy, StockLedger, post_entry};

impl<S, C> StockLedger<S, C>
where
    S: LedgerStore,
    C: ConfigProvider,
{
    /// Undo a movement by appending a compensating `Reversal` movement.
    ///
    /// The original is never modified; the new movement points at it through
    /// `reversal_of`. A movement can be reversed once, and reversals cannot be
    /// reversed.
    ///
    /// Entry notes come out of Available and discards go back into Available,
    /// whatever row the original touched. Adjustments restore the balance the
    /// row had before them, which is only allowed while the adjustment is still
    /// the latest movement on its row.
    #[instrument(skip(self, reason), fields(movement_id = %movement_id, user = %user), err)]
    pub async fn reverse(
        &self,
        movement_id: MovementId,
        user: UserId,
        reason: &str,
    ) -> LedgerResult<Movement> {
        let reason = require_reason(reason)?;
        let policy = LedgerPolicy::load(&self.config).await;
        let mut tx = self.store.begin().await?;

        let original = tx
            .find_movement(movement_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("movement {movement_id}")))?;

        if let Some(existing) = tx.find_reversal_of(movement_id).await? {
            return Err(LedgerError::business(format!(
                "movement {movement_id} was already reversed by {}",
                existing.id
            )));
        }

        let plan = plan_reversal(&original)?;
        let row = tx.lock_stock(plan.key).await?;

        if plan.requires_untouched_row() {
            let latest = tx.latest_movement_for_row(original.stock_row_id).await?;
            if latest.map(|m| m.id) != Some(original.id) {
                return Err(LedgerError::business(format!(
                    "row {} changed after adjustment {movement_id}; reverse the later movements first",
                    original.key
                )));
            }
        }

        let (effect, quantity) = plan.resolve(row.quantity)?;
        let entry = Entry {
            key: plan.key,
            movement_type: MovementType::Reversal,
            effect,
            quantity,
            responsible_user_id: user,
            source: original.source,
            unit_cost: None,
            reason: Some(reason),
            reversal_of: Some(original.id),
        };
        let (row, reversal) = post_entry(&mut tx, entry, policy).await?;
        tx.commit().await?;

        info!(
            reversal_id = %reversal.id,
            original_type = %original.movement_type,
            balance_after = row.quantity,
            "movement reversed"
        );
        Ok(reversal)
    }
}

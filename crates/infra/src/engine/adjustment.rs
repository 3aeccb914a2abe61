use tracing::{info, instrument};

use epiledger_stock::{decide_adjustment, estimated_impact, require_reason};

use crate::config::ConfigProvider;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger_store::{LedgerStore, LedgerTx};

use super::{
    AdjustmentResult, DirectAdjustment, LedgerPolicy, SimulationResult, StockLedger, adjust_in_tx,
};

impl<S, C> StockLedger<S, C>
where
    S: LedgerStore,
    C: ConfigProvider,
{
    /// Set a row to an exact quantity, recording the difference as a
    /// positive or negative adjustment movement.
    ///
    /// A zero difference records nothing and returns `movement_id: None`.
    #[instrument(
        skip(self, request),
        fields(key = %request.key(), new_quantity = request.new_quantity),
        err
    )]
    pub async fn apply_direct_adjustment(
        &self,
        request: DirectAdjustment,
    ) -> LedgerResult<AdjustmentResult> {
        let reason = require_reason(&request.reason)?;
        if request.require_permission_check && !self.config.allow_forced_adjustments().await {
            return Err(LedgerError::business("forced adjustments are disabled"));
        }

        let key = request.key();
        let policy = LedgerPolicy::load(&self.config).await;
        let mut tx = self.store.begin().await?;

        let adjusted = adjust_in_tx(
            &mut tx,
            key,
            request.new_quantity,
            reason,
            request.user_id,
            None,
            policy,
        )
        .await?;
        tx.commit().await?;

        let decision = adjusted.decision;
        let result = AdjustmentResult {
            key,
            stock_row_id: adjusted.row.as_ref().map(|r| r.id),
            movement_id: adjusted.movement.as_ref().map(|m| m.id),
            balance_before: decision.current,
            balance_after: decision.target,
            difference: decision.difference,
            kind: decision.kind,
            below_minimum: policy.is_below_minimum(decision.target),
        };

        info!(
            difference = result.difference,
            kind = ?result.kind,
            movement_id = ?result.movement_id,
            "direct adjustment applied"
        );
        Ok(result)
    }

    /// Compute what [`StockLedger::apply_direct_adjustment`] would do,
    /// without writing anything.
    #[instrument(
        skip(self, request),
        fields(key = %request.key(), new_quantity = request.new_quantity),
        err
    )]
    pub async fn simulate(
        &self,
        request: &DirectAdjustment,
    ) -> LedgerResult<SimulationResult> {
        let key = request.key();
        let policy = LedgerPolicy::load(&self.config).await;

        // Dropped without commit.
        let mut tx = self.store.begin().await?;
        let row = tx.find_stock(key).await?;
        drop(tx);

        let current = row.as_ref().map_or(0, |r| r.quantity);
        let unit_cost = row.as_ref().and_then(|r| r.unit_cost);
        let decision = decide_adjustment(current, request.new_quantity, policy.negative_stock)?;

        Ok(SimulationResult {
            key,
            current_balance: current,
            new_quantity: decision.target,
            difference: decision.difference,
            kind: decision.kind,
            unit_cost,
            estimated_impact: estimated_impact(decision.difference, unit_cost),
        })
    }
}

//! Physical inventory counts: apply them to the ledger, or just compare.

use tracing::{debug, info, instrument};
use uuid::Uuid;

use epiledger_core::WarehouseId;
use epiledger_stock::{
    AdjustmentKind, CountedItem, SourceKind, SourceRef, StockKey, divergence_for, estimated_impact,
    summarize, validate_counted_items,
};

use crate::config::ConfigProvider;
use crate::error::LedgerResult;
use crate::ledger_store::{LedgerStore, LedgerTx};

use super::{
    AppliedAdjustment, DivergenceReport, InventoryCount, InventoryResult, LedgerPolicy,
    StockLedger, adjust_in_tx,
};

const DEFAULT_COUNT_REASON: &str = "inventory count adjustment";

impl<S, C> StockLedger<S, C>
where
    S: LedgerStore,
    C: ConfigProvider,
{
    /// Bring every counted Available row of a warehouse to its counted
    /// quantity, all in one transaction.
    ///
    /// Items are validated before anything is touched. Items whose count
    /// matches the ledger produce no movement. If any item fails, no movement
    /// of the count is kept.
    ///
    /// Items are processed, and reported, in equipment type order.
    #[instrument(
        skip(self, count),
        fields(warehouse = %count.warehouse_id, items = count.items.len()),
        err
    )]
    pub async fn execute_inventory(&self, count: InventoryCount) -> LedgerResult<InventoryResult> {
        validate_counted_items(&count.items)?;

        let observations = count
            .observations
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let count_id = count.count_id.unwrap_or_else(Uuid::now_v7);
        let source = SourceRef::new(SourceKind::InventoryCount, count_id);

        let mut items: Vec<&CountedItem> = count.items.iter().collect();
        items.sort_by_key(|item| item.equipment_type_id);

        let policy = LedgerPolicy::load(&self.config).await;
        let mut tx = self.store.begin().await?;

        let mut result = InventoryResult {
            count_id,
            adjustments: Vec::new(),
            positive_adjustments: 0,
            negative_adjustments: 0,
            unchanged_items: 0,
            estimated_financial_impact: 0,
        };

        for item in items {
            let key = StockKey::available(count.warehouse_id, item.equipment_type_id);
            let reason = item
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .or(observations)
                .unwrap_or(DEFAULT_COUNT_REASON)
                .to_string();

            let adjusted = adjust_in_tx(
                &mut tx,
                key,
                item.counted_quantity,
                reason,
                count.user_id,
                Some(source),
                policy,
            )
            .await?;

            let Some(movement) = adjusted.movement else {
                debug!(equipment_type = %item.equipment_type_id, "count matches ledger");
                result.unchanged_items += 1;
                continue;
            };

            let decision = adjusted.decision;
            match decision.kind {
                AdjustmentKind::Positive => result.positive_adjustments += 1,
                AdjustmentKind::Negative => result.negative_adjustments += 1,
                AdjustmentKind::Neutral => {}
            }

            let unit_cost = adjusted.row.as_ref().and_then(|r| r.unit_cost);
            let impact = estimated_impact(decision.difference, unit_cost);
            if let Some(impact) = impact {
                result.estimated_financial_impact =
                    result.estimated_financial_impact.saturating_add(impact);
            }

            result.adjustments.push(AppliedAdjustment {
                equipment_type_id: item.equipment_type_id,
                movement_id: movement.id,
                movement_type: movement.movement_type,
                balance_before: decision.current,
                balance_after: decision.target,
                difference: decision.difference,
                estimated_impact: impact,
            });
        }

        tx.commit().await?;

        info!(
            count_id = %count_id,
            positive = result.positive_adjustments,
            negative = result.negative_adjustments,
            unchanged = result.unchanged_items,
            impact = result.estimated_financial_impact,
            "inventory count applied"
        );
        Ok(result)
    }

    /// Compare counted quantities with the ledger without changing anything.
    #[instrument(skip(self, items), fields(warehouse = %warehouse_id, items = items.len()), err)]
    pub async fn validate_inventory_divergences(
        &self,
        warehouse_id: WarehouseId,
        items: &[CountedItem],
    ) -> LedgerResult<DivergenceReport> {
        validate_counted_items(items)?;

        // Read-only: dropped without commit.
        let mut tx = self.store.begin().await?;
        let mut divergences = Vec::with_capacity(items.len());
        for item in items {
            let key = StockKey::available(warehouse_id, item.equipment_type_id);
            let row = tx.find_stock(key).await?;
            divergences.push(divergence_for(item, row.as_ref())?);
        }
        drop(tx);

        let summary = summarize(&divergences);
        debug!(divergent = summary.divergent_items, "divergences computed");
        Ok(DivergenceReport {
            warehouse_id,
            items: divergences,
            summary,
        })
    }
}

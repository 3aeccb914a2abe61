//! Recording movements: single entries, transfers, returns and inspection
//! releases.

use tracing::{info, instrument};

use epiledger_core::UserId;
use epiledger_stock::{Movement, MovementType, SourceRef, StockEffect, StockKey, StockStatus};

use crate::config::ConfigProvider;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger_store::{LedgerStore, LedgerTx};

use super::{
    Entry, InspectionRelease, LedgerPolicy, RecordMovement, ReturnRequest, StockLedger,
    TransferRequest, TransferResult, post_entry,
};

impl<S, C> StockLedger<S, C>
where
    S: LedgerStore,
    C: ConfigProvider,
{
    /// Append one movement and update its row's balance atomically.
    ///
    /// Reversals go through [`StockLedger::reverse`]; passing
    /// `MovementType::Reversal` here is a validation error.
    #[instrument(
        skip(self, request),
        fields(
            movement_type = %request.movement_type,
            key = %request.key,
            quantity = request.quantity
        ),
        err
    )]
    pub async fn record(&self, request: RecordMovement) -> LedgerResult<Movement> {
        let Some(effect) = request.movement_type.natural_effect() else {
            return Err(LedgerError::validation(
                "reversals must be recorded through reverse()",
            ));
        };

        let policy = LedgerPolicy::load(&self.config).await;
        let mut tx = self.store.begin().await?;

        let mut entry = Entry::natural(
            request.movement_type,
            effect,
            request.key,
            request.quantity,
            request.responsible_user_id,
        );
        entry.source = request.source;
        entry.unit_cost = request.unit_cost;
        entry.reason = request.reason;

        let (row, movement) = post_entry(&mut tx, entry, policy).await?;
        tx.commit().await?;

        info!(
            movement_id = %movement.id,
            balance_before = movement.balance_before,
            balance_after = row.quantity,
            "movement recorded"
        );
        Ok(movement)
    }

    /// Move units between the Available rows of two warehouses.
    #[instrument(
        skip(self, request),
        fields(
            from = %request.from_warehouse_id,
            to = %request.to_warehouse_id,
            equipment_type = %request.equipment_type_id,
            quantity = request.quantity
        ),
        err
    )]
    pub async fn transfer(&self, request: TransferRequest) -> LedgerResult<TransferResult> {
        if request.from_warehouse_id == request.to_warehouse_id {
            return Err(LedgerError::validation(
                "transfer source and destination warehouses must differ",
            ));
        }

        let from = StockKey::available(request.from_warehouse_id, request.equipment_type_id);
        let to = StockKey::available(request.to_warehouse_id, request.equipment_type_id);
        let result = self
            .post_pair(
                from,
                to,
                request.quantity,
                request.responsible_user_id,
                request.source,
            )
            .await?;

        info!(
            outbound = %result.outbound.id,
            inbound = %result.inbound.id,
            "transfer recorded"
        );
        Ok(result)
    }

    /// Record units returned from a delivery into the row matching their
    /// condition.
    #[instrument(
        skip(self, request),
        fields(
            warehouse = %request.warehouse_id,
            equipment_type = %request.equipment_type_id,
            condition = ?request.condition
        ),
        err
    )]
    pub async fn record_return(
        &self,
        request: ReturnRequest,
    ) -> LedgerResult<Movement> {
        let key = StockKey::new(
            request.warehouse_id,
            request.equipment_type_id,
            request.condition.target_status(),
        );
        let mut record = RecordMovement::new(
            MovementType::ReturnEntry,
            key,
            request.quantity,
            request.responsible_user_id,
        );
        record.source = request.source;
        self.record(record).await
    }

    /// Release inspected units: approved ones back to Available, rejected ones
    /// to Quarantine.
    #[instrument(
        skip(self, request),
        fields(
            warehouse = %request.warehouse_id,
            equipment_type = %request.equipment_type_id,
            approved = request.approved
        ),
        err
    )]
    pub async fn release_inspection(
        &self,
        request: InspectionRelease,
    ) -> LedgerResult<TransferResult> {
        let from = StockKey::new(
            request.warehouse_id,
            request.equipment_type_id,
            StockStatus::AwaitingInspection,
        );
        let destination = if request.approved {
            StockStatus::Available
        } else {
            StockStatus::Quarantine
        };
        let to = from.with_status(destination);

        let result = self
            .post_pair(
                from,
                to,
                request.quantity,
                request.responsible_user_id,
                request.source,
            )
            .await?;

        info!(destination = %destination, "inspection released");
        Ok(result)
    }

    /// `TransferOut` on `from` plus `TransferIn` on `to`, in one transaction.
    async fn post_pair(
        &self,
        from: StockKey,
        to: StockKey,
        quantity: i64,
        user: UserId,
        source: Option<SourceRef>,
    ) -> LedgerResult<TransferResult> {
        let policy = LedgerPolicy::load(&self.config).await;
        let mut tx = self.store.begin().await?;

        let (first, second) = if from <= to { (from, to) } else { (to, from) };
        tx.lock_stock(first).await?;
        tx.lock_stock(second).await?;

        let mut outbound_entry = Entry::natural(
            MovementType::TransferOut,
            StockEffect::Decrease,
            from,
            quantity,
            user,
        );
        outbound_entry.source = source;
        let (_, outbound) = post_entry(&mut tx, outbound_entry, policy).await?;

        let mut inbound_entry = Entry::natural(
            MovementType::TransferIn,
            StockEffect::Increase,
            to,
            quantity,
            user,
        );
        inbound_entry.source = source;
        let (_, inbound) = post_entry(&mut tx, inbound_entry, policy).await?;

        tx.commit().await?;
        Ok(TransferResult { outbound, inbound })
    }
}

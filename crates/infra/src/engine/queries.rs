//! Read side: positions, history and balance audits.
//!
//! Every query opens a transaction and drops it without committing.

use tracing::{instrument, warn};

use epiledger_core::WarehouseId;
use epiledger_stock::{BalanceAudit, Movement, SourceRef, StockKey, StockRow, audit_chain};

use crate::config::ConfigProvider;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger_store::{LedgerStore, LedgerTx};

use super::StockLedger;

impl<S, C> StockLedger<S, C>
where
    S: LedgerStore,
    C: ConfigProvider,
{
    /// Current rows of a warehouse, every status.
    pub async fn stock_position(&self, warehouse_id: WarehouseId) -> LedgerResult<Vec<StockRow>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.stock_for_warehouse(warehouse_id).await?)
    }

    /// Movements of one row in ledger order; empty if the row does not exist.
    pub async fn history(&self, key: StockKey) -> LedgerResult<Vec<Movement>> {
        let mut tx = self.store.begin().await?;
        match tx.find_stock(key).await? {
            Some(row) => Ok(tx.movements_for_row(row.id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Movements produced by one source document.
    pub async fn movements_by_source(&self, source: SourceRef) -> LedgerResult<Vec<Movement>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.movements_by_source(source).await?)
    }

    /// Replay one row's movements and compare with its stored balance.
    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn audit_balance(&self, key: StockKey) -> LedgerResult<BalanceAudit> {
        let mut tx = self.store.begin().await?;
        let row = tx
            .find_stock(key)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("stock row {key}")))?;
        let movements = tx.movements_for_row(row.id).await?;

        let audit = audit_chain(&row, &movements);
        report(&audit);
        Ok(audit)
    }

    /// [`StockLedger::audit_balance`] over every row.
    #[instrument(skip(self), err)]
    pub async fn audit_all(&self) -> LedgerResult<Vec<BalanceAudit>> {
        let mut tx = self.store.begin().await?;
        let rows = tx.all_stock().await?;

        let mut audits = Vec::with_capacity(rows.len());
        for row in rows {
            let movements = tx.movements_for_row(row.id).await?;
            let audit = audit_chain(&row, &movements);
            report(&audit);
            audits.push(audit);
        }
        Ok(audits)
    }
}

fn report(audit: &BalanceAudit) {
    if !audit.is_consistent() {
        warn!(
            key = %audit.key,
            stored = audit.stored_balance,
            ledger = audit.ledger_balance,
            broken_links = audit.broken_links.len(),
            "stock balance drifted from ledger"
        );
    }
}

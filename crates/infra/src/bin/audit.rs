//! `epiledger-audit`: replay every stock row against its movements and print
//! one JSON line per row. Exits with status 1 when any row drifted.

use anyhow::Context;
use sqlx::PgPool;

use epiledger_infra::{
    ConfigService, EnvFallback, PostgresLedgerStore, PostgresSettings, StockLedger,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    epiledger_observability::init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = PgPool::connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store = PostgresLedgerStore::new(pool.clone());
    if std::env::var_os("LEDGER_APPLY_SCHEMA").is_some() {
        store.apply_schema().await.context("failed to apply ledger schema")?;
    }

    let config = ConfigService::new(PostgresSettings::new(pool), EnvFallback::from_process_env());
    let ledger = StockLedger::new(store, config);

    let audits = ledger.audit_all().await.context("audit failed")?;
    let drifted = audits.iter().filter(|a| !a.is_consistent()).count();
    for audit in &audits {
        println!("{}", serde_json::to_string(audit)?);
    }

    tracing::info!(rows = audits.len(), drifted, "ledger audit finished");
    if drifted > 0 {
        std::process::exit(1);
    }
    Ok(())
}

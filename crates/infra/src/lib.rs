//! Infrastructure layer: persistence, configuration and the stock ledger
//! engine that ties them to the pure rules of `epiledger-stock`.

pub mod config;
pub mod engine;
pub mod error;
pub mod ledger_store;


pub use config::{
    ConfigProvider, ConfigService, EnvFallback, InMemorySettings, PostgresSettings, SettingsSource,
};
pub use engine::{
    AdjustmentResult, AppliedAdjustment, DirectAdjustment, DivergenceReport, InspectionRelease,
    InventoryCount, InventoryResult, RecordMovement, ReturnRequest, SimulationResult, StockLedger,
    TransferRequest, TransferResult,
};
pub use error::{LedgerError, LedgerResult};
pub use ledger_store::{
    InMemoryLedgerStore, LedgerStore, LedgerTx, PostgresLedgerStore, StoreError,
};

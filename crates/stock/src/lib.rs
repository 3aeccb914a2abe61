//! Stock ledger domain module.
//!
//! This crate contains the rules that govern how movements change stock
//! balances, implemented purely as deterministic domain logic (no IO, no
//! storage). The infrastructure crate composes these rules with a
//! transactional store.

pub mod adjustment;
pub mod audit;
pub mod inventory;
pub mod movement;
pub mod posting;
pub mod reversal;
pub mod row;
pub mod status;

pub use adjustment::{
    AdjustmentDecision, AdjustmentKind, decide_adjustment, estimated_impact, require_reason,
};
pub use audit::{BalanceAudit, audit_chain};
pub use inventory::{
    CountedItem, Divergence, DivergenceSummary, divergence_for, summarize, validate_counted_items,
};
pub use movement::{Movement, MovementType, SourceKind, SourceRef, StockEffect};
pub use posting::{NegativeStockPolicy, Posting, post};
pub use reversal::{ReversalPlan, ReversalTarget, plan_reversal};
pub use row::{StockKey, StockRow};
pub use status::{ItemCondition, StockStatus};

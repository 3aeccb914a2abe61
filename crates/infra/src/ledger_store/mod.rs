//! Transactional persistence boundary for stock rows and movements.
//!
//! This module defines the unit of work the engine runs in, without making
//! any storage assumptions. Implementations: in-memory (tests/dev) and
//! Postgres.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryLedgerStore, InMemoryLedgerTx};
pub use postgres::{PostgresLedgerStore, PostgresLedgerTx};
pub use r#trait::{LedgerStore, LedgerTx, StoreError};

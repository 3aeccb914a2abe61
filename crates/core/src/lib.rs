//! `epiledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the stock ledger
//! (no infrastructure concerns): typed identifiers and the domain error model.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{EquipmentTypeId, MovementId, StockRowId, UserId, WarehouseId};

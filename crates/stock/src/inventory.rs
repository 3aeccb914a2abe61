//! Physical count reconciliation: divergences between counted and system
//! quantities.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use epiledger_core::{DomainError, DomainResult, EquipmentTypeId};

use crate::adjustment::{AdjustmentKind, estimated_impact, quantity_difference};
use crate::row::StockRow;

/// One line of a physical count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountedItem {
    pub equipment_type_id: EquipmentTypeId,
    pub counted_quantity: i64,
    pub reason: Option<String>,
}

impl CountedItem {
    pub fn new(equipment_type_id: EquipmentTypeId, counted_quantity: i64) -> Self {
        Self {
            equipment_type_id,
            counted_quantity,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Reject the whole count if any line is malformed.
///
/// Counts may not be empty, counted quantities may not be negative, and an
/// equipment type may appear only once.
pub fn validate_counted_items(items: &[CountedItem]) -> DomainResult<()> {
    if items.is_empty() {
        return Err(DomainError::validation("inventory count must have at least one item"));
    }

    let mut seen = HashSet::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        if item.counted_quantity < 0 {
            return Err(DomainError::validation(format!(
                "counted quantity must not be negative (item {idx}, equipment type {}, got {})",
                item.equipment_type_id, item.counted_quantity
            )));
        }
        if !seen.insert(item.equipment_type_id) {
            return Err(DomainError::validation(format!(
                "equipment type {} counted more than once (item {idx})",
                item.equipment_type_id
            )));
        }
    }
    Ok(())
}

/// Difference between a counted and a system quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Divergence {
    pub equipment_type_id: EquipmentTypeId,
    pub system_balance: i64,
    pub counted_quantity: i64,
    /// `counted_quantity - system_balance`.
    pub divergence: i64,
    /// Divergence relative to the system balance, in percent.
    pub divergence_pct: f64,
    pub kind: AdjustmentKind,
    pub unit_cost: Option<i64>,
    pub estimated_impact: Option<i64>,
}

impl Divergence {
    pub fn is_divergent(&self) -> bool {
        self.divergence != 0
    }
}

/// Compare one counted line with the row it targets (absent rows count as 0).
///
/// Fails on the same out-of-range differences a direct adjustment rejects.
pub fn divergence_for(item: &CountedItem, row: Option<&StockRow>) -> DomainResult<Divergence> {
    let system_balance = row.map(|r| r.quantity).unwrap_or(0);
    let unit_cost = row.and_then(|r| r.unit_cost);
    let divergence = quantity_difference(system_balance, item.counted_quantity)?;

    Ok(Divergence {
        equipment_type_id: item.equipment_type_id,
        system_balance,
        counted_quantity: item.counted_quantity,
        divergence,
        divergence_pct: percentage(divergence, system_balance),
        kind: AdjustmentKind::of(divergence),
        unit_cost,
        estimated_impact: estimated_impact(divergence, unit_cost),
    })
}

fn percentage(divergence: i64, system_balance: i64) -> f64 {
    if system_balance == 0 {
        return if divergence == 0 { 0.0 } else { 100.0 };
    }
    let pct = divergence as f64 / system_balance.abs() as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Aggregates over a divergence list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceSummary {
    pub total_items: usize,
    pub divergent_items: usize,
    pub positive: usize,
    pub negative: usize,
    pub min_divergence: Option<i64>,
    pub max_divergence: Option<i64>,
    pub max_abs_divergence_pct: Option<f64>,
    /// Sum of the impacts that could be estimated.
    pub total_estimated_impact: i64,
}

pub fn summarize(divergences: &[Divergence]) -> DivergenceSummary {
    let count = |kind| divergences.iter().filter(|d| d.kind == kind).count();

    DivergenceSummary {
        total_items: divergences.len(),
        divergent_items: divergences.iter().filter(|d| d.is_divergent()).count(),
        positive: count(AdjustmentKind::Positive),
        negative: count(AdjustmentKind::Negative),
        min_divergence: divergences.iter().map(|d| d.divergence).min(),
        max_divergence: divergences.iter().map(|d| d.divergence).max(),
        max_abs_divergence_pct: divergences
            .iter()
            .map(|d| d.divergence_pct.abs())
            .reduce(f64::max),
        total_estimated_impact: divergences
            .iter()
            .filter_map(|d| d.estimated_impact)
            .fold(0i64, i64::saturating_add),
    }
}

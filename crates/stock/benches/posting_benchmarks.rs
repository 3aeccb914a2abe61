//! Benchmarks for the pure posting path.
//!
//! Run with: cargo bench -p epiledger-stock

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use epiledger_core::{EquipmentTypeId, UserId, WarehouseId};
use epiledger_stock::{
    Movement, MovementType, NegativeStockPolicy, StockEffect, StockKey, StockRow, audit_chain, post,
};

fn build_history(len: usize) -> (StockRow, Vec<Movement>) {
    let key = StockKey::available(WarehouseId::new(), EquipmentTypeId::new());
    let mut row = StockRow::empty(key, Utc::now());
    let user = UserId::new();
    let mut movements = Vec::with_capacity(len);

    for i in 0..len {
        let (movement_type, effect) = if i % 3 == 2 {
            (MovementType::DeliveryExit, StockEffect::Decrease)
        } else {
            (MovementType::NoteEntry, StockEffect::Increase)
        };
        let posting = post(row.quantity, effect, 1, NegativeStockPolicy::Forbid)
            .expect("history stays non-negative");
        movements.push(Movement::from_posting(&row, movement_type, &posting, user, Utc::now()));
        row.quantity = posting.balance_after;
    }

    (row, movements)
}

fn bench_post(c: &mut Criterion) {
    c.bench_function("post_single_movement", |b| {
        b.iter(|| {
            post(
                black_box(1_000),
                black_box(StockEffect::Decrease),
                black_box(7),
                NegativeStockPolicy::Forbid,
            )
        })
    });
}

fn bench_audit(c: &mut Criterion) {
    let mut group = c.benchmark_group("audit_chain");
    for len in [100usize, 1_000, 10_000] {
        let (row, movements) = build_history(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| audit_chain(black_box(&row), black_box(&movements)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_post, bench_audit);
criterion_main!(benches);

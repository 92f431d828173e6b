//! Benchmark harness using Criterion for latency measurement.
//!
//! Measures:
//! - Insert into a new or an existing price level
//! - Cancel order at several book sizes
//! - WAL append per record type
//! - Mixed workload
//! - Replay throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use slab_lob::{
    replay_into, MatchRecord, NewOrder, OrderBook, RecoveryPolicy, Side, Wal, WalConfig, WalReader,
};

/// Generate a random resting order
fn random_order(rng: &mut ChaCha8Rng) -> NewOrder {
    let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
    let price = match side {
        Side::Bid => rng.gen_range(9900..10000) * 100,
        Side::Ask => rng.gen_range(10000..10100) * 100,
    };
    NewOrder::limit(rng.gen_range(1..1000), side, price, rng.gen_range(1..1000))
}

/// Benchmark: insert joining an existing level, then cancel it again
fn bench_insert_existing_level(c: &mut Criterion) {
    let mut book = OrderBook::new(100_000, 1, 0, 0).unwrap();
    book.warm_up();
    book.place(0, &NewOrder::limit(1, Side::Bid, 9000, 100)).unwrap();

    c.bench_function("insert_existing_level", |b| {
        b.iter(|| {
            let handle = book
                .place(0, &NewOrder::limit(1, Side::Bid, 9000, 100))
                .unwrap();
            black_box(book.cancel(handle.order_id).unwrap())
        })
    });
}

/// Benchmark: insert creating a level deep in the ladder
fn bench_insert_new_level(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_new_level");

    for depth in [1u64, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let mut book = OrderBook::new(100_000, 1, 0, 0).unwrap();
            book.warm_up();
            for i in 0..depth {
                book.place(0, &NewOrder::limit(1, Side::Ask, 10_000 + i * 10, 100))
                    .unwrap();
            }

            // Worst price: walks the whole ladder
            let price = 10_000 + depth * 10;
            b.iter(|| {
                let handle = book.place(0, &NewOrder::limit(2, Side::Ask, price, 100)).unwrap();
                black_box(book.cancel(handle.order_id).unwrap())
            })
        });
    }

    group.finish();
}

/// Benchmark: Cancel order
fn bench_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("cancel");

    for book_size in [100u64, 1000, 10000] {
        group.bench_with_input(BenchmarkId::from_parameter(book_size), &book_size, |b, &book_size| {
            let mut book = OrderBook::new(100_000, 1, 0, 0).unwrap();
            book.warm_up();

            // Pre-populate book
            let mut live = std::collections::VecDeque::new();
            for i in 0..book_size {
                let side = if i % 2 == 0 { Side::Bid } else { Side::Ask };
                let price = if side == Side::Bid { 9000 } else { 11000 } + (i % 100) * 10;
                live.push_back(book.place(0, &NewOrder::limit(1, side, price, 100)).unwrap());
            }

            b.iter(|| {
                // Cancel the oldest order
                let Some(oldest) = live.pop_front() else {
                    return;
                };
                let removed = book.cancel(oldest.order_id).unwrap();

                // Replenish
                let order = NewOrder::limit(1, removed.side, removed.price, 100);
                live.push_back(book.place(0, &order).unwrap());

                black_box(removed);
            })
        });
    }

    group.finish();
}

/// Benchmark: WAL append latency (buffered, no fsync)
fn bench_wal_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("wal_append");
    let dir = tempfile::tempdir().unwrap();

    for hot_size in [0usize, 64] {
        group.bench_with_input(BenchmarkId::new("insert", hot_size), &hot_size, |b, &hot_size| {
            let config = WalConfig::new(dir.path().join(format!("insert-{hot_size}.wal")));
            let mut wal = Wal::open(&config, hot_size, 0).unwrap();
            let mut book = OrderBook::new(16, 1, hot_size, 0).unwrap();
            let handle = book.place(0, &NewOrder::limit(1, Side::Bid, 100, 1)).unwrap();

            b.iter(|| black_box(wal.append_insert(book.arena(), handle.slot).unwrap()))
        });
    }

    group.bench_function("cancel", |b| {
        let mut wal = Wal::open(&WalConfig::new(dir.path().join("cancel.wal")), 0, 0).unwrap();
        let mut order_id = 0u64;
        b.iter(|| {
            order_id += 1;
            black_box(wal.append_cancel(order_id, 0, 0).unwrap())
        })
    });

    group.bench_function("match", |b| {
        let mut wal = Wal::open(&WalConfig::new(dir.path().join("match.wal")), 0, 0).unwrap();
        let record = MatchRecord::new(1, 2, 100, 5, 0);
        b.iter(|| black_box(wal.append_match(&record).unwrap()))
    });

    group.finish();
}

/// Benchmark: Mixed workload (realistic trading scenario)
fn bench_mixed_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_workload");

    // 70% place, 30% cancel
    group.bench_function("70_place_30_cancel", |b| {
        let mut book = OrderBook::new(100_000, 1, 0, 0).unwrap();
        book.warm_up();

        let mut rng = ChaCha8Rng::seed_from_u64(0xDEADBEEF);
        let mut live: Vec<u64> = Vec::new();

        // Pre-populate
        for _ in 0..1000 {
            live.push(book.place(0, &random_order(&mut rng)).unwrap().order_id);
        }

        b.iter(|| {
            if rng.gen_bool(0.7) && live.len() < 40_000 {
                let handle = book.place(0, &random_order(&mut rng)).unwrap();
                live.push(handle.order_id);
                black_box(handle);
            } else if !live.is_empty() {
                // Cancel (random existing order)
                let order_id = live.swap_remove(rng.gen_range(0..live.len()));
                black_box(book.cancel(order_id).unwrap());
            }
        })
    });

    group.finish();
}

/// Benchmark: Replay throughput (records per second)
fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");
    group.throughput(Throughput::Elements(10_000));

    let dir = tempfile::tempdir().unwrap();
    let config = WalConfig::new(dir.path().join("replay.wal"));
    {
        let mut rng = ChaCha8Rng::seed_from_u64(0xCAFEBABE);
        let mut book = OrderBook::new(100_000, 1, 0, 0).unwrap();
        let mut wal = Wal::open(&config, 0, 0).unwrap();
        for _ in 0..10_000 {
            let handle = book.place(0, &random_order(&mut rng)).unwrap();
            wal.append_insert(book.arena(), handle.slot).unwrap();
        }
        wal.fsync().unwrap();
    }

    group.bench_function("10000_inserts", |b| {
        b.iter(|| {
            let mut book = OrderBook::new(100_000, 1, 0, 0).unwrap();
            let mut reader = WalReader::open(&config.path, true).unwrap();
            black_box(replay_into(&mut book, &mut reader, RecoveryPolicy::Abort).unwrap())
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_existing_level,
    bench_insert_new_level,
    bench_cancel,
    bench_wal_append,
    bench_mixed_workload,
    bench_replay,
);

criterion_main!(benches);

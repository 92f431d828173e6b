use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use hdrhistogram::Histogram;
use slab_lob::{Engine, EngineConfig, NewOrder, Side, WalConfig};
use tracing_subscriber::EnvFilter;

/// Place/cancel latency distribution, optionally with the WAL in the path.
#[derive(Parser, Debug)]
#[command(name = "latency-report")]
struct Args {
    /// Number of place operations to time
    #[arg(long, default_value_t = 1_000_000)]
    iterations: u64,

    /// Arena capacity
    #[arg(long, default_value_t = 100_000)]
    capacity: u32,

    /// Log every operation to this file
    #[arg(long)]
    wal: Option<PathBuf>,

    /// Records between fsyncs (0 = never)
    #[arg(long, default_value_t = 0)]
    sync_interval: u32,

    /// Write the log with O_DIRECT
    #[arg(long)]
    direct_io: bool,
}

/// Orders kept resting; older ones are cancelled to make room.
const WINDOW: u64 = 10_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    println!("Preparing Latency Benchmark...");

    let config = EngineConfig {
        capacity: args.capacity,
        max_products: 1,
        hot_size: 16,
        cold_size: 0,
        wal: args.wal.clone().map(|path| WalConfig {
            sync_interval: args.sync_interval,
            direct_io: args.direct_io,
            ..WalConfig::new(path)
        }),
    };
    let mut engine = Engine::open(&config)?;
    engine.warm_up();

    let mut place_hist = Histogram::<u64>::new_with_bounds(1, 10_000_000, 3)?;
    let mut cancel_hist = Histogram::<u64>::new_with_bounds(1, 10_000_000, 3)?;

    println!("Running {} iterations...", args.iterations);

    let mut live = std::collections::VecDeque::with_capacity(WINDOW as usize);
    let mut total_duration = Duration::ZERO;
    let payload = [0xA5u8; 16];

    for i in 0..args.iterations {
        if live.len() as u64 >= WINDOW {
            if let Some(order_id) = live.pop_front() {
                let start = Instant::now();
                std::hint::black_box(engine.cancel(order_id)?);
                let elapsed = start.elapsed();
                cancel_hist.record(elapsed.as_nanos() as u64).unwrap_or(());
                total_duration += elapsed;
            }
        }

        let side = if i % 2 == 0 { Side::Bid } else { Side::Ask };
        let price = match side {
            Side::Bid => 9_900 + (i % 100),
            Side::Ask => 10_100 + (i % 100),
        };
        let order = NewOrder::limit(1, side, price, 10);

        // Critical measurement section
        let start = Instant::now();
        let handle = std::hint::black_box(engine.place(0, &order, &payload, &[])?);
        let elapsed = start.elapsed();

        place_hist.record(elapsed.as_nanos() as u64).unwrap_or(());
        total_duration += elapsed;
        live.push_back(handle.order_id);
    }
    engine.fsync()?;

    let ops = place_hist.len() + cancel_hist.len();
    println!("\n=== Latency Report (ns) ===");
    println!("Total Ops:  {}", ops);
    println!("Throughput: {:.2} ops/sec", ops as f64 / total_duration.as_secs_f64());
    if let Some(wal) = engine.wal() {
        println!("WAL bytes:  {}", wal.bytes_written());
    }
    report("place", &place_hist);
    report("cancel", &cancel_hist);

    Ok(())
}

fn report(name: &str, histogram: &Histogram<u64>) {
    if histogram.is_empty() {
        return;
    }
    println!("--- {name} ---");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());

    // Quick ASCII histogram
    println!("Distribution:");
    for v in histogram.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("<= {:8} ns: {:10} count", v.value_iterated_to(), count);
        }
    }
}

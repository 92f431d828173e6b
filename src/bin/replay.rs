use std::path::PathBuf;

use clap::{Parser, Subcommand};
use slab_lob::wal::Record;
use slab_lob::{replay_into, OrderBook, RecoveryPolicy, Side, WalError, WalReader};
use tracing_subscriber::EnvFilter;

/// Inspect a write-ahead log or rebuild a book from it.
#[derive(Parser, Debug)]
#[command(name = "replay")]
struct Args {
    /// Log file
    path: PathBuf,

    /// The log carries no CRC32 trailers
    #[arg(long)]
    no_crc: bool,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Print every record
    Dump {
        /// Stop after this many records
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Rebuild a book and print its top of book per product
    Recover {
        #[arg(long, default_value_t = 1 << 20)]
        capacity: u32,
        #[arg(long, default_value_t = 16)]
        max_products: usize,
        #[arg(long, default_value_t = 0)]
        hot_size: usize,
        #[arg(long, default_value_t = 0)]
        cold_size: usize,
        /// Skip damaged records instead of stopping
        #[arg(long)]
        skip_corrupt: bool,
        /// Levels to print per side
        #[arg(long, default_value_t = 5)]
        depth: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    let mut reader = WalReader::open(&args.path, !args.no_crc)?;

    match args.command {
        Mode::Dump { limit } => dump(&mut reader, limit),
        Mode::Recover {
            capacity,
            max_products,
            hot_size,
            cold_size,
            skip_corrupt,
            depth,
        } => {
            let mut book = OrderBook::new(capacity, max_products, hot_size, cold_size)?;
            let policy = if skip_corrupt {
                RecoveryPolicy::SkipCorrupt
            } else {
                RecoveryPolicy::Abort
            };
            let stats = replay_into(&mut book, &mut reader, policy)?;

            println!("=== Recovery ===");
            println!("Inserts:       {}", stats.inserts);
            println!("Cancels:       {}", stats.cancels);
            println!("Matches:       {}", stats.matches);
            println!("Others:        {}", stats.others());
            println!("Skipped:       {}", stats.skipped);
            println!("Bytes:         {}", stats.bytes);
            println!("Last sequence: {}", stats.last_sequence);
            println!("Resting:       {} orders, {} levels", book.order_count(), book.level_count());

            for product in 0..book.max_products() as u16 {
                if book.best_bid(product).is_none() && book.best_ask(product).is_none() {
                    continue;
                }
                println!("\n--- product {product} ---");
                for level in book.levels(product, Side::Ask).take(depth).collect::<Vec<_>>().iter().rev() {
                    println!("  ASK {:>12} {:>10} ({})", level.price, level.volume, level.orders);
                }
                for level in book.levels(product, Side::Bid).take(depth) {
                    println!("  BID {:>12} {:>10} ({})", level.price, level.volume, level.orders);
                }
            }
            Ok(())
        }
    }
}

fn dump<R: std::io::Read>(
    reader: &mut WalReader<R>,
    limit: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut printed = 0u64;
    loop {
        if limit.is_some_and(|limit| printed >= limit) {
            break;
        }
        let raw = match reader.next_record() {
            Ok(Some(raw)) => raw,
            Ok(None) => break,
            Err(e @ WalError::CrcMismatch { .. }) => {
                println!("!! {e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let (sequence, offset) = (raw.sequence, raw.offset);
        match raw.decode()? {
            Record::Insert(insert) => {
                let meta = insert.meta;
                println!(
                    "{sequence:>10} @{offset:<10} INSERT     order={} product={} org={} price={} qty={}/{} flags={:#06x} slot={}",
                    meta.order_id,
                    meta.product_id,
                    meta.org_id,
                    meta.price,
                    meta.remaining,
                    meta.volume,
                    meta.flags,
                    meta.slot_index
                );
            }
            Record::Cancel(order) => println!(
                "{sequence:>10} @{offset:<10} CANCEL     order={} product={} slot={}",
                order.order_id, order.product_id, order.slot_index
            ),
            Record::Activate(order) => println!(
                "{sequence:>10} @{offset:<10} ACTIVATE   order={} product={} slot={}",
                order.order_id, order.product_id, order.slot_index
            ),
            Record::Deactivate(order) => println!(
                "{sequence:>10} @{offset:<10} DEACTIVATE order={} product={} slot={}",
                order.order_id, order.product_id, order.slot_index
            ),
            Record::Match(fill) => println!(
                "{sequence:>10} @{offset:<10} MATCH      maker={} taker={} product={} price={} qty={}",
                fill.maker_id, fill.taker_id, fill.product_id, fill.price, fill.volume
            ),
            Record::User { kind, payload } => println!(
                "{sequence:>10} @{offset:<10} USER {kind:#04x}  {} bytes",
                payload.len()
            ),
        }
        printed += 1;
    }
    println!("-- {printed} records, {} bytes of valid log", reader.offset());
    Ok(())
}

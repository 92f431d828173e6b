//! Recovery - rebuild a book by replaying its write-ahead log.
//!
//! Replay drives the same book operations the live path uses, so a log
//! produced by a book and replayed into an empty one yields the same
//! ladders, FIFOs and order IDs.

use std::io::{self, Read};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{RecoveryError, WalError};
use crate::order_book::OrderBook;
use crate::wal::{InsertRecord, Record, WalReader};

/// What to do with a damaged record in the middle of the log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Stop at the first CRC or framing error
    #[default]
    Abort,
    /// Log and skip it, then continue with the next record
    SkipCorrupt,
}

/// Counters reported by a replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub inserts: u64,
    pub cancels: u64,
    pub matches: u64,
    pub activates: u64,
    pub deactivates: u64,
    /// Caller-defined records, counted but not applied
    pub user: u64,
    /// Damaged records passed over under `SkipCorrupt`
    pub skipped: u64,
    /// Bytes of valid log consumed
    pub bytes: u64,
    pub last_sequence: u64,
}

impl RecoveryStats {
    /// Records that are neither inserts, cancels nor matches.
    #[inline]
    pub fn others(&self) -> u64 {
        self.activates + self.deactivates + self.user
    }

    /// All records applied or counted.
    #[inline]
    pub fn records(&self) -> u64 {
        self.inserts + self.cancels + self.matches + self.others()
    }
}

/// Replay the log at `path` into `book`, stopping at the first error.
///
/// A missing file is an empty log.
pub fn recover_into(
    book: &mut OrderBook,
    path: impl AsRef<Path>,
    crc_enabled: bool,
) -> Result<RecoveryStats, RecoveryError> {
    let path = path.as_ref();
    let mut reader = match WalReader::open(path, crc_enabled) {
        Ok(reader) => reader,
        Err(WalError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            info!(target: "recovery", path = %path.display(), "no log to recover");
            return Ok(RecoveryStats::default());
        }
        Err(e) => return Err(e.into()),
    };
    replay_into(book, &mut reader, RecoveryPolicy::Abort)
}

/// Replay every record `reader` yields into `book`.
pub fn replay_into<R: Read>(
    book: &mut OrderBook,
    reader: &mut WalReader<R>,
    policy: RecoveryPolicy,
) -> Result<RecoveryStats, RecoveryError> {
    info!(target: "recovery", ?policy, orders = book.order_count(), "replay started");
    let mut stats = RecoveryStats::default();

    loop {
        let raw = match reader.next_record() {
            Ok(Some(raw)) => raw,
            Ok(None) => break,
            Err(e @ (WalError::CrcMismatch { .. } | WalError::Corrupt { .. }))
                if policy == RecoveryPolicy::SkipCorrupt =>
            {
                warn!(target: "recovery", error = %e, "skipping damaged record");
                stats.skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let sequence = raw.sequence;
        let record = raw.decode()?;
        apply(book, sequence, &record, &mut stats)?;
        stats.last_sequence = sequence;
    }

    stats.bytes = reader.offset();
    info!(
        target: "recovery",
        inserts = stats.inserts,
        cancels = stats.cancels,
        matches = stats.matches,
        others = stats.others(),
        skipped = stats.skipped,
        last_sequence = stats.last_sequence,
        orders = book.order_count(),
        "replay finished"
    );
    Ok(stats)
}

fn apply(
    book: &mut OrderBook,
    sequence: u64,
    record: &Record<'_>,
    stats: &mut RecoveryStats,
) -> Result<(), RecoveryError> {
    let rejected = |source| RecoveryError::Book { sequence, source };

    match record {
        Record::Insert(insert) => {
            restore_insert(book, sequence, insert)?;
            stats.inserts += 1;
        }
        Record::Cancel(order) => {
            book.cancel(order.order_id).map_err(rejected)?;
            stats.cancels += 1;
        }
        Record::Match(fill) => {
            book.apply_match(fill).map_err(rejected)?;
            stats.matches += 1;
        }
        Record::Activate(order) => {
            book.activate(order.order_id).map_err(rejected)?;
            stats.activates += 1;
        }
        Record::Deactivate(order) => {
            book.deactivate(order.order_id).map_err(rejected)?;
            stats.deactivates += 1;
        }
        Record::User { kind, payload } => {
            debug!(target: "recovery", sequence, kind, len = payload.len(), "user record");
            stats.user += 1;
        }
    }
    Ok(())
}

fn restore_insert(
    book: &mut OrderBook,
    sequence: u64,
    insert: &InsertRecord<'_>,
) -> Result<(), RecoveryError> {
    let arena = (book.arena().hot_size(), book.arena().cold_size());
    let record = (insert.hot.len(), insert.cold.len());
    if record != arena {
        return Err(RecoveryError::SizeMismatch {
            sequence,
            record,
            arena,
        });
    }

    let rejected = |source| RecoveryError::Book { sequence, source };
    let slot = book.restore(&insert.meta).map_err(rejected)?;
    book.data_mut(slot).copy_from_slice(insert.hot);
    book.aux_data_mut(slot).copy_from_slice(insert.cold);

    if let Err(source) = book.insert(insert.meta.product_id, slot) {
        book.discard(slot).map_err(rejected)?;
        return Err(rejected(source));
    }
    if slot != insert.meta.slot_index {
        debug!(
            target: "recovery",
            sequence,
            logged = insert.meta.slot_index,
            restored = slot,
            "order restored into a different slot"
        );
    }
    Ok(())
}

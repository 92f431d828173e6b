//! Write-ahead log.
//!
//! A single append-only file of framed binary records. The writer makes
//! book mutations durable; the reader streams them back for recovery.
//!
//! ## Record types
//!
//! | Tag         | Payload                                   |
//! |-------------|-------------------------------------------|
//! | 1 INSERT    | 48-byte metadata, hot bytes, cold bytes   |
//! | 2 CANCEL    | order id, timestamp, slot, product        |
//! | 3 MATCH     | maker, taker, price, volume, product, ts  |
//! | 4 ACTIVATE  | as CANCEL                                 |
//! | 5 DEACTIVATE| as CANCEL                                 |
//! | 0x80..=0xFF | caller defined                            |

pub mod buffer;
pub mod reader;
pub mod record;
pub mod writer;

pub use reader::WalReader;
pub use record::{
    record_type, InsertMeta, InsertRecord, MatchRecord, OrderRecord, RawRecord, Record,
};
pub use writer::Wal;

use crate::arena::{Arena, SlotIndex};

/// Supplies a slot's cold bytes when an INSERT is logged.
///
/// The arena serves its own aux slab; callers that keep cold data
/// elsewhere implement this to log it without copying into the arena.
pub trait AuxSource {
    fn aux_bytes(&self, slot: SlotIndex) -> &[u8];
}

impl AuxSource for Arena {
    #[inline]
    fn aux_bytes(&self, slot: SlotIndex) -> &[u8] {
        self.aux_data(slot)
    }
}

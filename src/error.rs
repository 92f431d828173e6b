//! Error types for every layer of the book.
//!
//! Exhaustion and not-found are ordinary outcomes a caller is expected to
//! handle (reject the order, ignore the cancel). I/O and integrity failures
//! come from the write-ahead log and are always propagated.

use std::io;

use thiserror::Error;

use crate::arena::SlotIndex;

/// Errors raised by the slot arena.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// No free slot is left.
    #[error("arena exhausted")]
    Exhausted,

    /// The slab regions could not be reserved.
    #[error("failed to allocate {bytes} bytes for the slot slabs")]
    AllocFailed { bytes: usize },

    /// The primary and aux free lists disagree about the next slot.
    #[error("slab free lists out of step: primary {primary}, aux {aux}")]
    SlabDesync { primary: SlotIndex, aux: SlotIndex },

    /// Slot index outside the arena.
    #[error("slot {0} is out of range")]
    InvalidSlot(SlotIndex),

    #[error("invalid arena configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised by order book operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookError {
    /// No slot left for the order or its price level.
    #[error("no free slot for order or price level")]
    Exhausted,

    #[error("order {0} not found")]
    OrderNotFound(u64),

    #[error("order {0} already exists")]
    DuplicateOrderId(u64),

    #[error("product {0} is out of range")]
    UnknownProduct(u16),

    #[error("order {0} has no remaining quantity")]
    InvalidQuantity(u64),

    /// A fill larger than what is left on the order.
    #[error("fill of {fill} exceeds remaining {remaining} on order {order_id}")]
    Overfill {
        order_id: u64,
        remaining: u32,
        fill: u32,
    },

    /// A match naming the same order as maker and taker.
    #[error("order {0} cannot match against itself")]
    SelfMatch(u64),

    /// A match whose product differs from that of an order it fills.
    #[error("order {order_id} trades product {actual}, match is for {expected}")]
    ProductMismatch {
        order_id: u64,
        expected: u16,
        actual: u16,
    },

    /// Every order ID has been handed out.
    #[error("order ID space exhausted")]
    IdSpaceExhausted,

    #[error("order {0} is already active")]
    AlreadyActive(u64),

    #[error("order {0} is already inactive")]
    AlreadyInactive(u64),

    #[error(transparent)]
    Arena(ArenaError),
}

impl From<ArenaError> for BookError {
    fn from(err: ArenaError) -> Self {
        match err {
            ArenaError::Exhausted => BookError::Exhausted,
            other => BookError::Arena(other),
        }
    }
}

/// Errors raised while writing or reading the write-ahead log.
#[derive(Debug, Error)]
pub enum WalError {
    #[error("WAL I/O error: {0}")]
    Io(#[from] io::Error),

    /// Checksum failure; the reader has already stepped past the record.
    #[error("CRC mismatch on record {sequence} at offset {offset}")]
    CrcMismatch { sequence: u64, offset: u64 },

    /// Structural damage that is not a torn tail.
    #[error("corrupt WAL at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("record of {len} bytes does not fit the {capacity} byte buffer")]
    RecordTooLarge { len: usize, capacity: usize },

    #[error("record type {0:#04x} is reserved")]
    InvalidRecordType(u8),

    #[error("slot data sizes {actual:?} do not match the log's {expected:?}")]
    SizeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("invalid WAL configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised while rebuilding a book from a log.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error(transparent)]
    Wal(#[from] WalError),

    /// A replayed operation was rejected by the book.
    #[error("record {sequence} could not be applied: {source}")]
    Book {
        sequence: u64,
        #[source]
        source: BookError,
    },

    /// Insert records carry data sizes the live arena cannot hold.
    #[error("record {sequence} carries hot/cold sizes {record:?}, arena uses {arena:?}")]
    SizeMismatch {
        sequence: u64,
        record: (usize, usize),
        arena: (usize, usize),
    },
}

/// Errors raised by the engine wrapper.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Book(#[from] BookError),

    #[error(transparent)]
    Wal(#[from] WalError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Arena(#[from] ArenaError),

    /// Caller data longer than the slot region it is copied into.
    #[error("{len} bytes of slot data exceed the {capacity} byte region")]
    DataTooLarge { len: usize, capacity: usize },
}

//! Record framing and payload layouts.
//!
//! Every record is an 8-byte little-endian header word followed by the
//! payload and, when enabled, a CRC32 of header and payload:
//!
//! ```text
//! [header u64: seq << 24 | type << 16 | len][payload: len bytes][crc32 u32]?
//! ```
//!
//! Sequences are 40 bits and start at 1, so a valid header is never zero.
//! A zero word marks block padding.

use chrono::Utc;

use crate::arena::{Slot, SlotIndex};
use crate::error::WalError;

pub const HEADER_LEN: usize = 8;
pub const CRC_LEN: usize = 4;
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;
pub const MAX_SEQUENCE: u64 = (1 << 40) - 1;

/// Fixed metadata block that opens an INSERT payload.
pub const INSERT_META_LEN: usize = 48;
/// CANCEL, ACTIVATE and DEACTIVATE payload.
pub const ORDER_RECORD_LEN: usize = 24;
pub const MATCH_RECORD_LEN: usize = 40;

/// Record type tags.
pub mod record_type {
    pub const INSERT: u8 = 1;
    pub const CANCEL: u8 = 2;
    pub const MATCH: u8 = 3;
    pub const ACTIVATE: u8 = 4;
    pub const DEACTIVATE: u8 = 5;
    /// First tag available to callers.
    pub const USER_MIN: u8 = 0x80;

    /// True for tags a reader understands.
    #[inline]
    pub const fn is_known(kind: u8) -> bool {
        matches!(kind, INSERT..=DEACTIVATE) || kind >= USER_MIN
    }
}

/// Wall-clock nanoseconds for record timestamps.
#[inline]
pub fn now_nanos() -> u64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default().max(0) as u64
}

/// Unpacked header word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub sequence: u64,
    pub kind: u8,
    pub len: u16,
}

impl RecordHeader {
    #[inline]
    pub const fn pack(&self) -> u64 {
        (self.sequence << 24) | ((self.kind as u64) << 16) | self.len as u64
    }

    #[inline]
    pub const fn unpack(word: u64) -> Self {
        Self {
            sequence: word >> 24,
            kind: (word >> 16) as u8,
            len: word as u16,
        }
    }
}

/// Bytes a record occupies on disk.
#[inline]
pub const fn frame_len(payload_len: usize, crc_enabled: bool) -> usize {
    HEADER_LEN + payload_len + if crc_enabled { CRC_LEN } else { 0 }
}

/// INSERT payload length for the given data sizes, padded to 8.
#[inline]
pub const fn insert_payload_len(hot_size: usize, cold_size: usize) -> usize {
    (INSERT_META_LEN + hot_size + cold_size).div_ceil(8) * 8
}

// ============================================================================
// Little-endian field access
// ============================================================================

#[inline]
fn get_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[inline]
fn get_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

#[inline]
fn get_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

#[inline]
fn put(buf: &mut [u8], at: usize, bytes: &[u8]) {
    buf[at..at + bytes.len()].copy_from_slice(bytes);
}

// ============================================================================
// Payloads
// ============================================================================

/// Order state captured by an INSERT record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InsertMeta {
    pub order_id: u64,
    pub price: u64,
    pub timestamp: u64,
    pub volume: u32,
    pub remaining: u32,
    pub org_id: u32,
    pub slot_index: SlotIndex,
    pub flags: u16,
    pub product_id: u16,
    pub hot_size: u16,
    pub cold_size: u16,
}

impl InsertMeta {
    pub fn from_slot(slot: &Slot, slot_index: SlotIndex, hot_size: usize, cold_size: usize) -> Self {
        Self {
            order_id: slot.order_id,
            price: slot.price,
            timestamp: now_nanos(),
            volume: slot.volume,
            remaining: slot.remaining,
            org_id: slot.org_id,
            slot_index,
            flags: slot.flags,
            product_id: slot.product_id,
            hot_size: hot_size as u16,
            cold_size: cold_size as u16,
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        put(buf, 0, &self.order_id.to_le_bytes());
        put(buf, 8, &self.price.to_le_bytes());
        put(buf, 16, &self.timestamp.to_le_bytes());
        put(buf, 24, &self.volume.to_le_bytes());
        put(buf, 28, &self.remaining.to_le_bytes());
        put(buf, 32, &self.org_id.to_le_bytes());
        put(buf, 36, &self.slot_index.to_le_bytes());
        put(buf, 40, &self.flags.to_le_bytes());
        put(buf, 42, &self.product_id.to_le_bytes());
        put(buf, 44, &self.hot_size.to_le_bytes());
        put(buf, 46, &self.cold_size.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            order_id: get_u64(buf, 0),
            price: get_u64(buf, 8),
            timestamp: get_u64(buf, 16),
            volume: get_u32(buf, 24),
            remaining: get_u32(buf, 28),
            org_id: get_u32(buf, 32),
            slot_index: get_u32(buf, 36),
            flags: get_u16(buf, 40),
            product_id: get_u16(buf, 42),
            hot_size: get_u16(buf, 44),
            cold_size: get_u16(buf, 46),
        }
    }
}

/// INSERT: order metadata plus the slot's hot and cold bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InsertRecord<'a> {
    pub meta: InsertMeta,
    pub hot: &'a [u8],
    pub cold: &'a [u8],
}

/// CANCEL, ACTIVATE or DEACTIVATE of one order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderRecord {
    pub order_id: u64,
    pub timestamp: u64,
    pub slot_index: SlotIndex,
    pub product_id: u16,
}

impl OrderRecord {
    pub fn new(order_id: u64, slot_index: SlotIndex, product_id: u16) -> Self {
        Self {
            order_id,
            timestamp: now_nanos(),
            slot_index,
            product_id,
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        put(buf, 0, &self.order_id.to_le_bytes());
        put(buf, 8, &self.timestamp.to_le_bytes());
        put(buf, 16, &self.slot_index.to_le_bytes());
        put(buf, 20, &self.product_id.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            order_id: get_u64(buf, 0),
            timestamp: get_u64(buf, 8),
            slot_index: get_u32(buf, 16),
            product_id: get_u16(buf, 20),
        }
    }
}

/// An execution between a resting maker and a taker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchRecord {
    pub maker_id: u64,
    pub taker_id: u64,
    pub price: u64,
    pub volume: u32,
    pub product_id: u16,
    pub timestamp: u64,
}

impl MatchRecord {
    pub fn new(maker_id: u64, taker_id: u64, price: u64, volume: u32, product_id: u16) -> Self {
        Self {
            maker_id,
            taker_id,
            price,
            volume,
            product_id,
            timestamp: now_nanos(),
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        put(buf, 0, &self.maker_id.to_le_bytes());
        put(buf, 8, &self.taker_id.to_le_bytes());
        put(buf, 16, &self.price.to_le_bytes());
        put(buf, 24, &self.volume.to_le_bytes());
        put(buf, 28, &self.product_id.to_le_bytes());
        put(buf, 32, &self.timestamp.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            maker_id: get_u64(buf, 0),
            taker_id: get_u64(buf, 8),
            price: get_u64(buf, 16),
            volume: get_u32(buf, 24),
            product_id: get_u16(buf, 28),
            timestamp: get_u64(buf, 32),
        }
    }
}

// ============================================================================
// Decoded records
// ============================================================================

/// A framed record as read from the log, payload not yet interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawRecord<'a> {
    pub sequence: u64,
    pub kind: u8,
    pub payload: &'a [u8],
    /// File offset of the header word
    pub offset: u64,
}

impl<'a> RawRecord<'a> {
    #[inline]
    pub fn decode(&self) -> Result<Record<'a>, WalError> {
        Record::decode(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Record<'a> {
    Insert(InsertRecord<'a>),
    Cancel(OrderRecord),
    Match(MatchRecord),
    Activate(OrderRecord),
    Deactivate(OrderRecord),
    User { kind: u8, payload: &'a [u8] },
}

impl<'a> Record<'a> {
    /// Interpret a raw record.
    pub fn decode(raw: &RawRecord<'a>) -> Result<Self, WalError> {
        let payload = raw.payload;
        let record = match raw.kind {
            record_type::INSERT => {
                let meta = check_insert(payload).map_err(|reason| WalError::Corrupt {
                    offset: raw.offset,
                    reason,
                })?;
                let hot_end = INSERT_META_LEN + meta.hot_size as usize;
                let cold_end = hot_end + meta.cold_size as usize;
                Record::Insert(InsertRecord {
                    meta,
                    hot: &payload[INSERT_META_LEN..hot_end],
                    cold: &payload[hot_end..cold_end],
                })
            }
            record_type::CANCEL | record_type::ACTIVATE | record_type::DEACTIVATE => {
                expect_len(raw, ORDER_RECORD_LEN)?;
                let order = OrderRecord::decode(payload);
                match raw.kind {
                    record_type::CANCEL => Record::Cancel(order),
                    record_type::ACTIVATE => Record::Activate(order),
                    _ => Record::Deactivate(order),
                }
            }
            record_type::MATCH => {
                expect_len(raw, MATCH_RECORD_LEN)?;
                Record::Match(MatchRecord::decode(payload))
            }
            kind if kind >= record_type::USER_MIN => Record::User { kind, payload },
            kind => return Err(WalError::InvalidRecordType(kind)),
        };
        Ok(record)
    }

    /// Order the record refers to, if any.
    pub fn order_id(&self) -> Option<u64> {
        match self {
            Record::Insert(insert) => Some(insert.meta.order_id),
            Record::Cancel(order) | Record::Activate(order) | Record::Deactivate(order) => {
                Some(order.order_id)
            }
            Record::Match(fill) => Some(fill.maker_id),
            Record::User { .. } => None,
        }
    }
}

fn expect_len(raw: &RawRecord<'_>, len: usize) -> Result<(), WalError> {
    if raw.payload.len() == len {
        Ok(())
    } else {
        Err(WalError::Corrupt {
            offset: raw.offset,
            reason: format!(
                "record type {} carries {} bytes, expected {len}",
                raw.kind,
                raw.payload.len()
            ),
        })
    }
}

/// Validate an INSERT payload's framing and return its metadata.
pub(crate) fn check_insert(payload: &[u8]) -> Result<InsertMeta, String> {
    if payload.len() < INSERT_META_LEN {
        return Err(format!(
            "insert payload of {} bytes is shorter than its metadata",
            payload.len()
        ));
    }
    let meta = InsertMeta::decode(payload);
    let expected = insert_payload_len(meta.hot_size as usize, meta.cold_size as usize);
    if payload.len() != expected {
        return Err(format!(
            "insert declares {}+{} data bytes but frame holds {}",
            meta.hot_size,
            meta.cold_size,
            payload.len()
        ));
    }
    Ok(meta)
}

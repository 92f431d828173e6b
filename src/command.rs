//! Order flags, admission parameters and engine commands.
//!
//! A resting order stores its side and type in a packed `flags` word so the
//! slot stays one cache line and the same bits can be journaled verbatim.

use crate::wal::MatchRecord;

/// Bit 0: set for asks.
pub const FLAG_ASK: u16 = 1 << 0;
/// Bits 1..=2: order type.
pub const FLAG_TYPE_MASK: u16 = 0b11 << 1;
const FLAG_TYPE_SHIFT: u16 = 1;
/// Bit 3: order is parked outside its price level.
pub const FLAG_INACTIVE: u16 = 1 << 3;

/// Order side (bid = buy, ask = sell)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Bid = 0,
    /// Sell side (asks)
    Ask = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    #[inline]
    pub const fn from_flags(flags: u16) -> Self {
        if flags & FLAG_ASK != 0 {
            Side::Ask
        } else {
            Side::Bid
        }
    }

    /// True if `price` ranks ahead of `other` on this side.
    #[inline]
    pub const fn is_better(self, price: u64, other: u64) -> bool {
        match self {
            Side::Bid => price > other,
            Side::Ask => price < other,
        }
    }
}

/// Order type. The book only rests orders; the type is carried for the
/// matching layer above and survives a journal round trip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OrderType {
    #[default]
    Limit = 0,
    /// Immediate-or-cancel
    Ioc = 1,
    /// Fill-or-kill
    Fok = 2,
    /// Only rests; never takes
    PostOnly = 3,
}

impl OrderType {
    #[inline]
    pub const fn from_flags(flags: u16) -> Self {
        match (flags & FLAG_TYPE_MASK) >> FLAG_TYPE_SHIFT {
            1 => OrderType::Ioc,
            2 => OrderType::Fok,
            3 => OrderType::PostOnly,
            _ => OrderType::Limit,
        }
    }
}

/// Pack side and type into a flags word.
#[inline]
pub const fn order_flags(side: Side, order_type: OrderType) -> u16 {
    let side_bit = match side {
        Side::Bid => 0,
        Side::Ask => FLAG_ASK,
    };
    side_bit | ((order_type as u16) << FLAG_TYPE_SHIFT)
}

// ============================================================================
// Input Commands
// ============================================================================

/// Parameters of an order entering the book.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewOrder {
    /// Trading organization that owns the order
    pub org_id: u32,
    /// Order side (bid/ask)
    pub side: Side,
    pub order_type: OrderType,
    /// Fixed-point price (e.g., $100.50 -> 10050000)
    pub price: u64,
    /// Order quantity
    pub qty: u32,
}

impl NewOrder {
    /// A plain limit order.
    pub fn limit(org_id: u32, side: Side, price: u64, qty: u32) -> Self {
        Self {
            org_id,
            side,
            order_type: OrderType::Limit,
            price,
            qty,
        }
    }

    #[inline]
    pub fn flags(&self) -> u16 {
        order_flags(self.side, self.order_type)
    }
}

/// Commands a shard owner applies to its book.
#[derive(Clone, Debug)]
pub enum Command {
    /// Rest a new order; `hot` and `cold` seed the slot's data regions
    Place {
        product_id: u16,
        order: NewOrder,
        hot: Vec<u8>,
        cold: Vec<u8>,
    },
    /// Cancel an existing order
    Cancel { order_id: u64 },
    /// Apply an execution decided by the matching layer
    Match(MatchRecord),
    /// Put a parked order back at the tail of its price level
    Activate { order_id: u64 },
    /// Park an order outside its price level
    Deactivate { order_id: u64 },
}

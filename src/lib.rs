//! # slab-lob
//!
//! A slab-backed limit order book with a write-ahead log and deterministic
//! replay.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: One thread owns a book and its log exclusively (no locks)
//! - **Fixed Capacity**: Every slot is allocated up front; no heap allocation per order
//! - **Cache-Optimized**: 64-byte aligned slots, 32-bit indices instead of pointers
//! - **Log Before Effect**: A mutation is journaled before the book changes
//!
//! ## Architecture
//!
//! ```text
//! [Engine] --validate--> [WAL append] --> [OrderBook] --> [Queue links in Arena]
//!                             |
//!                      [recovery replay on restart]
//! ```

pub mod arena;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod order_book;
pub mod queue;
pub mod recovery;
pub mod wal;

// Re-exports for convenience
pub use arena::{Arena, Role, Slot, SlotIndex, NULL_SLOT};
pub use command::{Command, NewOrder, OrderType, Side};
pub use config::{EngineConfig, WalConfig};
pub use engine::{Engine, Outcome};
pub use error::{ArenaError, BookError, EngineError, RecoveryError, WalError};
pub use order_book::{FillOutcome, LevelView, MatchOutcome, OrderBook, OrderHandle, RemovedOrder};
pub use recovery::{recover_into, replay_into, RecoveryPolicy, RecoveryStats};
pub use wal::{AuxSource, MatchRecord, Record, Wal, WalReader};

//! Engine - single-writer shard owner of a book and its log.
//!
//! Every mutation is validated against the book, appended to the WAL,
//! and only then applied. A record that reached the log therefore always
//! replays cleanly, and a mutation that failed to log never happened.

use tracing::{debug, info};

use crate::arena::Slot;
use crate::command::{Command, NewOrder};
use crate::config::EngineConfig;
use crate::error::{BookError, EngineError};
use crate::order_book::{MatchOutcome, OrderBook, OrderHandle, OrderLocation, RemovedOrder};
use crate::recovery::{recover_into, RecoveryStats};
use crate::wal::{MatchRecord, Wal};

/// Result of one processed command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Placed(OrderHandle),
    Canceled(RemovedOrder),
    Matched(MatchOutcome),
    Activated { order_id: u64 },
    Deactivated { order_id: u64 },
}

/// The book plus its optional write-ahead log.
///
/// Not internally synchronized: one thread owns an engine, and more
/// throughput comes from more shards.
pub struct Engine {
    book: OrderBook,
    wal: Option<Wal>,
    recovered: RecoveryStats,
}

impl Engine {
    /// Build the book, replay any existing log into it, and open the
    /// log for appending.
    pub fn open(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let mut book = OrderBook::new(
            config.capacity,
            config.max_products,
            config.hot_size,
            config.cold_size,
        )?;

        let (wal, recovered) = match &config.wal {
            Some(wal_config) => {
                let stats = recover_into(&mut book, &wal_config.path, wal_config.crc_enabled)?;
                let wal = Wal::open(wal_config, config.hot_size, config.cold_size)?;
                (Some(wal), stats)
            }
            None => (None, RecoveryStats::default()),
        };

        info!(
            target: "engine",
            capacity = config.capacity,
            products = config.max_products,
            orders = book.order_count(),
            durable = wal.is_some(),
            "engine ready"
        );
        Ok(Self {
            book,
            wal,
            recovered,
        })
    }

    /// An engine without durability.
    pub fn in_memory(
        capacity: u32,
        max_products: usize,
        hot_size: usize,
        cold_size: usize,
    ) -> Result<Self, EngineError> {
        Self::open(&EngineConfig {
            capacity,
            max_products,
            hot_size,
            cold_size,
            wal: None,
        })
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Process a single command.
    ///
    /// This is the main entry point for synchronous usage (testing, benchmarks).
    pub fn process_command(&mut self, cmd: Command) -> Result<Outcome, EngineError> {
        match cmd {
            Command::Place {
                product_id,
                order,
                hot,
                cold,
            } => self
                .place(product_id, &order, &hot, &cold)
                .map(Outcome::Placed),
            Command::Cancel { order_id } => self.cancel(order_id).map(Outcome::Canceled),
            Command::Match(record) => self.apply_match(&record).map(Outcome::Matched),
            Command::Activate { order_id } => self
                .activate(order_id)
                .map(|()| Outcome::Activated { order_id }),
            Command::Deactivate { order_id } => self
                .deactivate(order_id)
                .map(|()| Outcome::Deactivated { order_id }),
        }
    }

    /// Rest a new order, seeding the leading bytes of its data regions.
    pub fn place(
        &mut self,
        product_id: u16,
        order: &NewOrder,
        hot: &[u8],
        cold: &[u8],
    ) -> Result<OrderHandle, EngineError> {
        let arena = self.book.arena();
        check_data(hot, arena.hot_size())?;
        check_data(cold, arena.cold_size())?;
        if product_id as usize >= self.book.max_products() {
            return Err(BookError::UnknownProduct(product_id).into());
        }
        if order.qty == 0 {
            return Err(BookError::InvalidQuantity(self.book.next_order_id()).into());
        }
        if !self.book.can_insert(product_id, order.side, order.price) {
            return Err(BookError::Exhausted.into());
        }

        let slot = self.book.prepare(product_id, order)?;
        self.book.data_mut(slot)[..hot.len()].copy_from_slice(hot);
        self.book.aux_data_mut(slot)[..cold.len()].copy_from_slice(cold);
        let order_id = self.book.arena().slot(slot).order_id;

        if let Some(wal) = &mut self.wal {
            if let Err(e) = wal.append_insert(self.book.arena(), slot) {
                self.book.discard(slot)?;
                return Err(e.into());
            }
        }
        self.book.insert(product_id, slot)?;
        Ok(OrderHandle { order_id, slot })
    }

    pub fn cancel(&mut self, order_id: u64) -> Result<RemovedOrder, EngineError> {
        let Some(loc) = self.book.lookup(order_id) else {
            debug!(target: "engine", order_id, "cancel of unknown order");
            return Err(BookError::OrderNotFound(order_id).into());
        };

        if let Some(wal) = &mut self.wal {
            wal.append_cancel(order_id, loc.slot, loc.product_id)?;
        }
        Ok(self.book.cancel(order_id)?)
    }

    /// Apply an execution decided by the matching layer.
    pub fn apply_match(&mut self, record: &MatchRecord) -> Result<MatchOutcome, EngineError> {
        self.book.check_match(record)?;

        if let Some(wal) = &mut self.wal {
            wal.append_match(record)?;
        }
        Ok(self.book.apply_match(record)?)
    }

    pub fn activate(&mut self, order_id: u64) -> Result<(), EngineError> {
        let (loc, slot) = self.resting(order_id)?;
        if !slot.is_inactive() {
            return Err(BookError::AlreadyActive(order_id).into());
        }
        if !self.book.can_activate(order_id) {
            return Err(BookError::Exhausted.into());
        }

        if let Some(wal) = &mut self.wal {
            wal.append_activate(order_id, loc.slot, loc.product_id)?;
        }
        Ok(self.book.activate(order_id)?)
    }

    pub fn deactivate(&mut self, order_id: u64) -> Result<(), EngineError> {
        let (loc, slot) = self.resting(order_id)?;
        if slot.is_inactive() {
            return Err(BookError::AlreadyInactive(order_id).into());
        }

        if let Some(wal) = &mut self.wal {
            wal.append_deactivate(order_id, loc.slot, loc.product_id)?;
        }
        Ok(self.book.deactivate(order_id)?)
    }

    /// Append a caller-defined record; the book is untouched.
    pub fn log_user(&mut self, kind: u8, bytes: &[u8]) -> Result<Option<u64>, EngineError> {
        match &mut self.wal {
            Some(wal) => Ok(Some(wal.append_user(kind, bytes)?)),
            None => Ok(None),
        }
    }

    fn resting(&self, order_id: u64) -> Result<(OrderLocation, Slot), EngineError> {
        match self.book.lookup(order_id) {
            Some(loc) => Ok((loc, *self.book.arena().slot(loc.slot))),
            None => {
                debug!(target: "engine", order_id, "unknown order");
                Err(BookError::OrderNotFound(order_id).into())
            }
        }
    }

    // ========================================================================
    // Durability
    // ========================================================================

    /// Write buffered records to the log file.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        if let Some(wal) = &mut self.wal {
            wal.flush()?;
        }
        Ok(())
    }

    /// Flush and wait for the log to reach the device.
    pub fn fsync(&mut self) -> Result<(), EngineError> {
        if let Some(wal) = &mut self.wal {
            wal.fsync()?;
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    #[inline]
    pub fn wal(&self) -> Option<&Wal> {
        self.wal.as_ref()
    }

    /// What the startup replay found.
    #[inline]
    pub fn recovered(&self) -> &RecoveryStats {
        &self.recovered
    }

    /// Warm up the engine by pre-faulting memory pages.
    pub fn warm_up(&mut self) {
        self.book.warm_up();
    }

    /// Get total order count.
    #[inline]
    pub fn order_count(&self) -> usize {
        self.book.order_count()
    }

    /// Compute state hash for determinism testing.
    #[inline]
    pub fn state_hash(&self) -> u64 {
        self.book.state_hash()
    }
}

fn check_data(bytes: &[u8], capacity: usize) -> Result<(), EngineError> {
    if bytes.len() > capacity {
        return Err(EngineError::DataTooLarge {
            len: bytes.len(),
            capacity,
        });
    }
    Ok(())
}

//! Order Book - per-product price ladders built on the slot arena.
//!
//! Each product has a bid and an ask ladder (Q1): a linear list of
//! price-level sentinel slots, best price first. Each level anchors a
//! ring of orders at that price (Q2) in arrival order. Orders are also
//! threaded onto a per-organization queue (Q3), and an FxHashMap maps
//! order IDs to their slot for O(1) cancel lookup.
//!
//! Best bid/ask is the head of a ladder and costs O(1). Inserting walks
//! the ladder to find the price, so it costs O(levels), never O(orders).

use std::fmt;

use arrayvec::ArrayVec;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::arena::{Arena, Role, Slot, SlotIndex, NULL_SLOT};
use crate::command::{order_flags, NewOrder, OrderType, Side, FLAG_INACTIVE};
use crate::error::{ArenaError, BookError};
use crate::queue::{self, QueueState};
use crate::wal::{InsertMeta, MatchRecord};

/// Mapping from order ID to where the order lives
pub type OrderMap = FxHashMap<u64, OrderLocation>;

/// Where an order lives: its slot and product.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderLocation {
    pub slot: SlotIndex,
    pub product_id: u16,
}

/// Ladder heads of one product.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProductBook {
    /// Best (highest) bid level
    pub bid_head: SlotIndex,
    /// Best (lowest) ask level
    pub ask_head: SlotIndex,
}

impl ProductBook {
    pub const fn new() -> Self {
        Self {
            bid_head: NULL_SLOT,
            ask_head: NULL_SLOT,
        }
    }

    #[inline]
    pub fn head(&self, side: Side) -> SlotIndex {
        match side {
            Side::Bid => self.bid_head,
            Side::Ask => self.ask_head,
        }
    }

    #[inline]
    fn set_head(&mut self, side: Side, index: SlotIndex) {
        match side {
            Side::Bid => self.bid_head = index,
            Side::Ask => self.ask_head = index,
        }
    }
}

impl Default for ProductBook {
    fn default() -> Self {
        Self::new()
    }
}

/// An order that was placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderHandle {
    pub order_id: u64,
    pub slot: SlotIndex,
}

/// What an order looked like when it left the book.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemovedOrder {
    pub order_id: u64,
    /// Slot the order occupied (already returned to the arena)
    pub slot: SlotIndex,
    pub product_id: u16,
    pub org_id: u32,
    pub side: Side,
    pub price: u64,
    /// Quantity still open at removal
    pub remaining: u32,
}

/// Result of applying a fill to one order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillOutcome {
    pub order_id: u64,
    pub filled: u32,
    pub remaining: u32,
}

impl FillOutcome {
    /// True if the fill exhausted the order and removed it.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// Result of applying a match to both sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchOutcome {
    pub maker: FillOutcome,
    /// `None` when the taker never rested in the book
    pub taker: Option<FillOutcome>,
}

/// Aggregate view of one price level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelView {
    pub price: u64,
    /// Sum of remaining quantity
    pub volume: u64,
    /// Number of orders
    pub orders: u32,
}

/// Multi-product limit order book over a slot arena.
pub struct OrderBook {
    arena: Arena,
    /// Ladder heads, indexed by product ID
    products: Vec<ProductBook>,
    /// Order lookup map: OrderId -> OrderLocation
    index: OrderMap,
    /// Per-organization queues of resting orders
    orgs: FxHashMap<u32, QueueState>,
    next_order_id: u64,
    level_count: usize,
}

impl OrderBook {
    /// Create a book with a fresh arena.
    pub fn new(
        capacity: u32,
        max_products: usize,
        hot_size: usize,
        cold_size: usize,
    ) -> Result<Self, ArenaError> {
        let arena = Arena::new(capacity, hot_size, cold_size)?;
        Self::with_arena(arena, max_products)
    }

    /// Create a book over an existing, empty arena.
    pub fn with_arena(arena: Arena, max_products: usize) -> Result<Self, ArenaError> {
        if max_products == 0 || max_products > u16::MAX as usize + 1 {
            return Err(ArenaError::InvalidConfig(format!(
                "max_products must be in 1..=65536, got {max_products}"
            )));
        }
        let orders = arena.capacity() as usize;
        Ok(Self {
            arena,
            products: vec![ProductBook::new(); max_products],
            index: FxHashMap::with_capacity_and_hasher(orders, Default::default()),
            orgs: FxHashMap::default(),
            next_order_id: 1,
            level_count: 0,
        })
    }

    // ========================================================================
    // Order Admission
    // ========================================================================

    /// Allocate and fill a slot for a new order without linking it.
    ///
    /// The order receives the next engine order ID. Follow with
    /// [`insert`](Self::insert), or [`discard`](Self::discard) to give the
    /// slot back.
    pub fn prepare(&mut self, product_id: u16, order: &NewOrder) -> Result<SlotIndex, BookError> {
        self.check_product(product_id)?;
        let order_id = self.next_order_id;
        if order_id == u64::MAX {
            return Err(BookError::IdSpaceExhausted);
        }
        if order.qty == 0 {
            return Err(BookError::InvalidQuantity(order_id));
        }

        let index = self.arena.allocate()?;
        let slot = self.arena.slot_mut(index);
        slot.order_id = order_id;
        slot.price = order.price;
        slot.volume = order.qty;
        slot.remaining = order.qty;
        slot.org_id = order.org_id;
        slot.flags = order.flags();
        slot.product_id = product_id;

        self.next_order_id += 1;
        Ok(index)
    }

    /// Allocate and fill a slot from a journaled order without linking it.
    pub fn restore(&mut self, meta: &InsertMeta) -> Result<SlotIndex, BookError> {
        self.check_product(meta.product_id)?;
        if meta.remaining == 0 {
            return Err(BookError::InvalidQuantity(meta.order_id));
        }

        let index = self.arena.allocate()?;
        let slot = self.arena.slot_mut(index);
        slot.order_id = meta.order_id;
        slot.price = meta.price;
        slot.volume = meta.volume;
        slot.remaining = meta.remaining;
        slot.org_id = meta.org_id;
        slot.flags = meta.flags & !FLAG_INACTIVE;
        slot.product_id = meta.product_id;

        self.reserve_order_id(meta.order_id);
        Ok(index)
    }

    /// Return a prepared but never inserted slot to the arena.
    ///
    /// The slot's order ID is handed out again if nothing newer was.
    pub fn discard(&mut self, index: SlotIndex) -> Result<(), BookError> {
        let order_id = self.arena.slot(index).order_id;
        match self.lookup(order_id) {
            Some(loc) if loc.slot == index => return Err(BookError::DuplicateOrderId(order_id)),
            Some(_) => {}
            None if order_id.checked_add(1) == Some(self.next_order_id) => {
                self.next_order_id = order_id
            }
            None => {}
        }
        self.arena.free(index)?;
        Ok(())
    }

    /// Allocate, fill and insert an order in one step.
    pub fn place(&mut self, product_id: u16, order: &NewOrder) -> Result<OrderHandle, BookError> {
        let slot = self.prepare(product_id, order)?;
        let order_id = self.arena.slot(slot).order_id;

        if let Err(err) = self.insert(product_id, slot) {
            self.discard(slot)?;
            return Err(err);
        }
        Ok(OrderHandle { order_id, slot })
    }

    /// True if placing a new order at this price cannot run out of slots.
    ///
    /// A new order needs its own slot plus one for the level if the
    /// price is not resting yet.
    pub fn can_insert(&self, product_id: u16, side: Side, price: u64) -> bool {
        let needed = if self.price_level_exists(product_id, side, price) { 1 } else { 2 };
        self.arena.available() >= needed
    }

    /// Link a filled order slot into the book.
    ///
    /// # Algorithm
    /// 1. Find the price level on the order's side, walking from the best
    /// 2. Create and splice in a level sentinel if none exists
    /// 3. Append the order to the level's time FIFO
    /// 4. Append the order to its organization's queue
    /// 5. Record the order ID in the index
    pub fn insert(&mut self, product_id: u16, index: SlotIndex) -> Result<(), BookError> {
        self.check_product(product_id)?;
        let slot = *self.arena.slot(index);
        if slot.remaining == 0 {
            return Err(BookError::InvalidQuantity(slot.order_id));
        }
        if self.index.contains_key(&slot.order_id) {
            return Err(BookError::DuplicateOrderId(slot.order_id));
        }

        {
            let slot = self.arena.slot_mut(index);
            slot.product_id = product_id;
            slot.flags &= !FLAG_INACTIVE;
        }
        self.link_into_level(product_id, slot.side(), index)?;

        self.orgs
            .entry(slot.org_id)
            .or_default()
            .push_back(self.arena.slots_mut(), index, Role::Org);
        self.index.insert(
            slot.order_id,
            OrderLocation {
                slot: index,
                product_id,
            },
        );
        self.reserve_order_id(slot.order_id);

        trace!(
            target: "book",
            order_id = slot.order_id,
            product_id,
            price = slot.price,
            qty = slot.remaining,
            "order inserted"
        );
        Ok(())
    }

    // ========================================================================
    // Order Removal
    // ========================================================================

    /// Remove an order from the book and free its slot.
    pub fn cancel(&mut self, order_id: u64) -> Result<RemovedOrder, BookError> {
        let removed = self.remove(order_id)?;
        trace!(target: "book", order_id, remaining = removed.remaining, "order canceled");
        Ok(removed)
    }

    fn remove(&mut self, order_id: u64) -> Result<RemovedOrder, BookError> {
        let loc = self.lookup(order_id).ok_or(BookError::OrderNotFound(order_id))?;
        let slot = *self.arena.slot(loc.slot);

        if !slot.is_inactive() {
            self.unlink_from_level(loc.product_id, loc.slot)?;
        }

        if let Some(queue) = self.orgs.get_mut(&slot.org_id) {
            if queue.remove(self.arena.slots_mut(), loc.slot, Role::Org) {
                self.orgs.remove(&slot.org_id);
            }
        }

        self.index.remove(&order_id);
        self.arena.free(loc.slot)?;

        Ok(RemovedOrder {
            order_id,
            slot: loc.slot,
            product_id: loc.product_id,
            org_id: slot.org_id,
            side: slot.side(),
            price: slot.price,
            remaining: slot.remaining,
        })
    }

    // ========================================================================
    // Fills and Activation
    // ========================================================================

    /// Reduce an order's open quantity; a full fill removes it.
    pub fn apply_fill(&mut self, order_id: u64, qty: u32) -> Result<FillOutcome, BookError> {
        let loc = self.lookup(order_id).ok_or(BookError::OrderNotFound(order_id))?;
        let remaining = self.arena.slot(loc.slot).remaining;
        if qty > remaining {
            return Err(BookError::Overfill {
                order_id,
                remaining,
                fill: qty,
            });
        }

        if qty == remaining {
            self.remove(order_id)?;
        } else {
            self.arena.slot_mut(loc.slot).remaining = remaining - qty;
        }

        Ok(FillOutcome {
            order_id,
            filled: qty,
            remaining: remaining - qty,
        })
    }

    /// Apply an execution to its maker and, if resting, its taker.
    ///
    /// Both sides are validated before either is touched.
    pub fn apply_match(&mut self, record: &MatchRecord) -> Result<MatchOutcome, BookError> {
        self.check_match(record)?;
        let taker_rests = self.index.contains_key(&record.taker_id);

        let maker = self.apply_fill(record.maker_id, record.volume)?;
        let taker = if taker_rests {
            Some(self.apply_fill(record.taker_id, record.volume)?)
        } else {
            None
        };
        Ok(MatchOutcome { maker, taker })
    }

    /// Validate an execution without applying it.
    ///
    /// The maker must rest on the record's product with enough open
    /// quantity; a resting taker must be a different order on the same
    /// product, with the same bound.
    pub fn check_match(&self, record: &MatchRecord) -> Result<(), BookError> {
        if record.maker_id == record.taker_id {
            return Err(BookError::SelfMatch(record.maker_id));
        }
        self.check_match_side(record.maker_id, record)?;
        if self.index.contains_key(&record.taker_id) {
            self.check_match_side(record.taker_id, record)?;
        }
        Ok(())
    }

    fn check_match_side(&self, order_id: u64, record: &MatchRecord) -> Result<(), BookError> {
        let slot = self.order(order_id).ok_or(BookError::OrderNotFound(order_id))?;
        if slot.product_id != record.product_id {
            return Err(BookError::ProductMismatch {
                order_id,
                expected: record.product_id,
                actual: slot.product_id,
            });
        }
        self.check_fill(order_id, record.volume)
    }

    /// Validate a fill without applying it.
    pub fn check_fill(&self, order_id: u64, qty: u32) -> Result<(), BookError> {
        let slot = self.order(order_id).ok_or(BookError::OrderNotFound(order_id))?;
        if qty > slot.remaining {
            return Err(BookError::Overfill {
                order_id,
                remaining: slot.remaining,
                fill: qty,
            });
        }
        Ok(())
    }

    /// Park an order outside its price level.
    ///
    /// The order keeps its slot, its ID and its org queue membership but
    /// no longer counts toward level volume or best price.
    pub fn deactivate(&mut self, order_id: u64) -> Result<(), BookError> {
        let loc = self.lookup(order_id).ok_or(BookError::OrderNotFound(order_id))?;
        if self.arena.slot(loc.slot).is_inactive() {
            return Err(BookError::AlreadyInactive(order_id));
        }

        self.unlink_from_level(loc.product_id, loc.slot)?;
        self.arena.slot_mut(loc.slot).flags |= FLAG_INACTIVE;
        trace!(target: "book", order_id, "order deactivated");
        Ok(())
    }

    /// Put a parked order back at the tail of its price level.
    ///
    /// Time priority restarts from the moment of activation.
    pub fn activate(&mut self, order_id: u64) -> Result<(), BookError> {
        let loc = self.lookup(order_id).ok_or(BookError::OrderNotFound(order_id))?;
        let slot = *self.arena.slot(loc.slot);
        if !slot.is_inactive() {
            return Err(BookError::AlreadyActive(order_id));
        }

        self.link_into_level(loc.product_id, slot.side(), loc.slot)?;
        self.arena.slot_mut(loc.slot).flags &= !FLAG_INACTIVE;
        trace!(target: "book", order_id, "order activated");
        Ok(())
    }

    /// Check that activating this order cannot run out of slots.
    pub fn can_activate(&self, order_id: u64) -> bool {
        self.order(order_id).is_some_and(|slot| {
            self.price_level_exists(slot.product_id, slot.side(), slot.price)
                || !self.arena.is_full()
        })
    }

    // ========================================================================
    // Ladder Maintenance
    // ========================================================================

    fn link_into_level(
        &mut self,
        product_id: u16,
        side: Side,
        index: SlotIndex,
    ) -> Result<(), BookError> {
        let price = self.arena.slot(index).price;

        // Insertion point search: first level at or behind our price.
        let mut prev = NULL_SLOT;
        let mut cursor = self.products[product_id as usize].head(side);
        while cursor != NULL_SLOT {
            let level_price = self.arena.slot(cursor).price;
            if level_price == price || side.is_better(price, level_price) {
                break;
            }
            prev = cursor;
            cursor = self.arena.slot(cursor).link(Role::Ladder).next;
        }

        let level = if cursor != NULL_SLOT && self.arena.slot(cursor).price == price {
            cursor
        } else {
            let level = self.arena.allocate()?;
            {
                let sentinel = self.arena.slot_mut(level);
                sentinel.price = price;
                sentinel.flags = order_flags(side, OrderType::Limit);
                sentinel.product_id = product_id;
            }
            let slots = self.arena.slots_mut();
            queue::ring_init(slots, level, Role::Fifo);
            if cursor != NULL_SLOT {
                queue::link_before(slots, cursor, level, Role::Ladder);
            } else if prev != NULL_SLOT {
                queue::link_after(slots, prev, level, Role::Ladder);
            }
            if prev == NULL_SLOT {
                self.products[product_id as usize].set_head(side, level);
            }
            self.level_count += 1;
            level
        };

        queue::ring_push_back(self.arena.slots_mut(), level, index, Role::Fifo);
        Ok(())
    }

    /// Take an order out of its level's FIFO, dropping the level if it
    /// empties.
    fn unlink_from_level(&mut self, product_id: u16, index: SlotIndex) -> Result<(), BookError> {
        let old = queue::unlink(self.arena.slots_mut(), index, Role::Fifo);

        // Only the sentinel is left when both neighbours are the same slot.
        if old.prev == old.next {
            self.remove_level(product_id, old.prev)?;
        }
        Ok(())
    }

    fn remove_level(&mut self, product_id: u16, level: SlotIndex) -> Result<(), BookError> {
        debug_assert!(self.arena.slot(level).is_level());
        let side = self.arena.slot(level).side();

        let old = queue::unlink(self.arena.slots_mut(), level, Role::Ladder);
        if old.prev == NULL_SLOT {
            self.products[product_id as usize].set_head(side, old.next);
        }

        self.arena.free(level)?;
        self.level_count -= 1;
        Ok(())
    }

    #[inline]
    fn check_product(&self, product_id: u16) -> Result<(), BookError> {
        if (product_id as usize) < self.products.len() {
            Ok(())
        } else {
            Err(BookError::UnknownProduct(product_id))
        }
    }

    #[inline]
    fn head(&self, product_id: u16, side: Side) -> SlotIndex {
        self.products
            .get(product_id as usize)
            .map_or(NULL_SLOT, |book| book.head(side))
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    /// Get the best bid price (highest buy price)
    #[inline]
    pub fn best_bid(&self, product_id: u16) -> Option<u64> {
        self.best_price(product_id, Side::Bid)
    }

    /// Get the best ask price (lowest sell price)
    #[inline]
    pub fn best_ask(&self, product_id: u16) -> Option<u64> {
        self.best_price(product_id, Side::Ask)
    }

    /// Get the best price on a given side
    #[inline]
    pub fn best_price(&self, product_id: u16, side: Side) -> Option<u64> {
        let head = self.head(product_id, side);
        (head != NULL_SLOT).then(|| self.arena.slot(head).price)
    }

    /// Calculate spread (best_ask - best_bid)
    pub fn spread(&self, product_id: u16) -> Option<u64> {
        match (self.best_bid(product_id), self.best_ask(product_id)) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    // ========================================================================
    // Level Access
    // ========================================================================

    /// Sentinel slot of the level at `price`, if it exists.
    pub fn level_at(&self, product_id: u16, side: Side, price: u64) -> Option<SlotIndex> {
        queue::iter(self.arena.slots(), self.head(product_id, side), Role::Ladder)
            .take_while(|&level| !side.is_better(price, self.arena.slot(level).price))
            .find(|&level| self.arena.slot(level).price == price)
    }

    #[inline]
    pub fn price_level_exists(&self, product_id: u16, side: Side, price: u64) -> bool {
        self.level_at(product_id, side, price).is_some()
    }

    /// Total remaining quantity resting at `price`.
    pub fn volume_at_price(&self, product_id: u16, side: Side, price: u64) -> u64 {
        self.level_at(product_id, side, price)
            .map_or(0, |level| self.level_view(level).volume)
    }

    /// Order IDs resting at `price`, in time priority.
    pub fn orders_at_price(&self, product_id: u16, side: Side, price: u64) -> Vec<u64> {
        self.level_at(product_id, side, price)
            .map(|level| {
                queue::ring_iter(self.arena.slots(), level, Role::Fifo)
                    .map(|index| self.arena.slot(index).order_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Levels on one side, best first.
    pub fn levels(&self, product_id: u16, side: Side) -> impl Iterator<Item = LevelView> + '_ {
        queue::iter(self.arena.slots(), self.head(product_id, side), Role::Ladder)
            .map(move |level| self.level_view(level))
    }

    /// The best `N` levels of one side, without heap allocation.
    pub fn top_levels<const N: usize>(&self, product_id: u16, side: Side) -> ArrayVec<LevelView, N> {
        self.levels(product_id, side).take(N).collect()
    }

    fn level_view(&self, level: SlotIndex) -> LevelView {
        let (volume, orders) = queue::ring_iter(self.arena.slots(), level, Role::Fifo)
            .fold((0u64, 0u32), |(volume, orders), index| {
                (volume + self.arena.slot(index).remaining as u64, orders + 1)
            });
        LevelView {
            price: self.arena.slot(level).price,
            volume,
            orders,
        }
    }

    // ========================================================================
    // Order Access
    // ========================================================================

    /// Look up an order by ID.
    #[inline]
    pub fn lookup(&self, order_id: u64) -> Option<OrderLocation> {
        self.index.get(&order_id).copied()
    }

    /// The slot of a resting order.
    #[inline]
    pub fn order(&self, order_id: u64) -> Option<&Slot> {
        self.lookup(order_id).map(|loc| self.arena.slot(loc.slot))
    }

    /// Check if an order exists.
    #[inline]
    pub fn contains_order(&self, order_id: u64) -> bool {
        self.index.contains_key(&order_id)
    }

    /// Order IDs of one organization, oldest first.
    pub fn org_orders(&self, org_id: u32) -> impl Iterator<Item = u64> + '_ {
        let head = self.orgs.get(&org_id).map_or(NULL_SLOT, |queue| queue.head);
        queue::iter(self.arena.slots(), head, Role::Org).map(|index| self.arena.slot(index).order_id)
    }

    pub fn org_order_count(&self, org_id: u32) -> u32 {
        self.orgs.get(&org_id).map_or(0, |queue| queue.len)
    }

    /// Hot data of a slot.
    #[inline]
    pub fn data(&self, index: SlotIndex) -> &[u8] {
        self.arena.data(index)
    }

    #[inline]
    pub fn data_mut(&mut self, index: SlotIndex) -> &mut [u8] {
        self.arena.data_mut(index)
    }

    /// Cold data of a slot.
    #[inline]
    pub fn aux_data(&self, index: SlotIndex) -> &[u8] {
        self.arena.aux_data(index)
    }

    #[inline]
    pub fn aux_data_mut(&mut self, index: SlotIndex) -> &mut [u8] {
        self.arena.aux_data_mut(index)
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    #[inline]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Get the total number of orders in the book
    #[inline]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    /// Number of price levels across all products and sides
    #[inline]
    pub fn level_count(&self) -> usize {
        self.level_count
    }

    #[inline]
    pub fn max_products(&self) -> usize {
        self.products.len()
    }

    /// ID the next prepared order will receive.
    #[inline]
    pub fn next_order_id(&self) -> u64 {
        self.next_order_id
    }

    /// Keep the ID counter above `order_id`.
    #[inline]
    pub fn reserve_order_id(&mut self, order_id: u64) {
        self.next_order_id = self.next_order_id.max(order_id.saturating_add(1));
    }

    /// Check if the book is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Warm up the book (pre-fault memory pages)
    pub fn warm_up(&mut self) {
        self.arena.warm_up();
    }

    /// Compute a hash of the current state (for determinism testing).
    ///
    /// Covers every ladder in order, every FIFO in order, and every
    /// parked order, so two books with equal hashes have the same shape.
    pub fn state_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        let slots = self.arena.slots();

        for (product_id, book) in self.products.iter().enumerate() {
            for side in [Side::Bid, Side::Ask] {
                for level in queue::iter(slots, book.head(side), Role::Ladder) {
                    (product_id, side, slots[level as usize].price).hash(&mut hasher);
                    for index in queue::ring_iter(slots, level, Role::Fifo) {
                        hash_order(&slots[index as usize], &mut hasher);
                    }
                }
            }
        }

        let mut orgs: Vec<_> = self.orgs.iter().collect();
        orgs.sort_unstable_by_key(|(org_id, _)| **org_id);
        for (org_id, queue) in orgs {
            org_id.hash(&mut hasher);
            for index in queue.iter(slots, Role::Org) {
                hash_order(&slots[index as usize], &mut hasher);
            }
        }

        self.order_count().hash(&mut hasher);
        self.arena.allocated().hash(&mut hasher);
        self.next_order_id.hash(&mut hasher);

        hasher.finish()
    }
}

fn hash_order<H: std::hash::Hasher>(slot: &Slot, hasher: &mut H) {
    use std::hash::Hash;
    (slot.order_id, slot.remaining, slot.volume, slot.flags, slot.org_id).hash(hasher);
}

impl fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBook")
            .field("products", &self.products.len())
            .field("order_count", &self.index.len())
            .field("level_count", &self.level_count)
            .field("next_order_id", &self.next_order_id)
            .field("arena", &self.arena)
            .finish()
    }
}

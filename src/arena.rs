//! Slot Arena - dual slab allocator with an index-linked free list.
//!
//! The arena pre-allocates every slot at startup, eliminating heap
//! allocation in the hot path. It is made of two slabs addressed by the
//! same index:
//!
//! - the **primary** slab: one 64-byte [`Slot`] per index plus a flat
//!   region of `hot_size` caller bytes per index,
//! - the **aux** slab: `cold_size` caller bytes per index for larger,
//!   rarely touched payload.
//!
//! Both slabs keep their own free list and are always popped and pushed
//! together, so a slot index is enough to reach all three regions.

use std::fmt;

use crate::command::{OrderType, Side, FLAG_INACTIVE};
use crate::error::ArenaError;
use crate::queue::QueueState;

/// Sentinel value representing a null/invalid index (like nullptr)
pub const NULL_SLOT: u32 = u32::MAX;

/// Type alias for slot indices - our "compressed pointers".
///
/// Indices rather than addresses are stored everywhere so that a slot
/// reference means the same thing in memory and in the journal.
pub type SlotIndex = u32;

/// Which intrusive list a link pair belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Role {
    /// Arena free list
    Free = 0,
    /// Q1: price levels of one product side, best first
    Ladder = 1,
    /// Q2: orders at one price level, oldest first
    Fifo = 2,
    /// Q3: resting orders of one organization
    Org = 3,
}

/// Number of link pairs carried by each slot.
pub const ROLE_COUNT: usize = 4;

/// One next/prev pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Link {
    pub next: SlotIndex,
    pub prev: SlotIndex,
}

impl Link {
    pub const NULL: Link = Link {
        next: NULL_SLOT,
        prev: NULL_SLOT,
    };
}

/// A single order or price level - exactly 64 bytes (one cache line).
///
/// # Memory Layout
///
/// | Field      | Type      | Offset | Size |
/// |------------|-----------|--------|------|
/// | order_id   | u64       | 0      | 8    |
/// | price      | u64       | 8      | 8    |
/// | volume     | u32       | 16     | 4    |
/// | remaining  | u32       | 20     | 4    |
/// | org_id     | u32       | 24     | 4    |
/// | flags      | u16       | 28     | 2    |
/// | product_id | u16       | 30     | 2    |
/// | links      | [Link; 4] | 32     | 32   |
/// | **Total**  |           |        | 64   |
///
/// A price level reuses the layout with `remaining == 0`; its `Fifo`
/// link pair anchors the ring of orders resting at that price.
#[repr(C)]
#[repr(align(64))]
#[derive(Clone, Copy)]
pub struct Slot {
    /// Engine-assigned order ID (0 for price levels)
    pub order_id: u64,

    /// Fixed-point price (e.g., $100.50 -> 10050000 with 5 decimal places)
    pub price: u64,

    /// Original quantity
    pub volume: u32,

    /// Quantity still open; zero marks a price level
    pub remaining: u32,

    /// Owning organization
    pub org_id: u32,

    /// Side, order type and inactive bits (see `command`)
    pub flags: u16,

    pub product_id: u16,

    /// One link pair per `Role`
    pub links: [Link; ROLE_COUNT],
}

// Compile-time assertion: Slot must be exactly 64 bytes
const _: () = assert!(
    std::mem::size_of::<Slot>() == 64,
    "Slot must be exactly 64 bytes (one cache line)"
);

// Compile-time assertion: Slot must be 64-byte aligned
const _: () = assert!(
    std::mem::align_of::<Slot>() == 64,
    "Slot must be 64-byte aligned"
);

impl Slot {
    /// Create an empty slot with every link null
    #[inline]
    pub const fn empty() -> Self {
        Self {
            order_id: 0,
            price: 0,
            volume: 0,
            remaining: 0,
            org_id: 0,
            flags: 0,
            product_id: 0,
            links: [Link::NULL; ROLE_COUNT],
        }
    }

    #[inline]
    pub fn link(&self, role: Role) -> Link {
        self.links[role as usize]
    }

    /// True for price-level sentinels.
    #[inline]
    pub fn is_level(&self) -> bool {
        self.remaining == 0
    }

    #[inline]
    pub fn side(&self) -> Side {
        Side::from_flags(self.flags)
    }

    #[inline]
    pub fn order_type(&self) -> OrderType {
        OrderType::from_flags(self.flags)
    }

    /// True while the order is parked outside its price level.
    #[inline]
    pub fn is_inactive(&self) -> bool {
        self.flags & FLAG_INACTIVE != 0
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("order_id", &self.order_id)
            .field("product_id", &self.product_id)
            .field("org_id", &self.org_id)
            .field("price", &self.price)
            .field("volume", &self.volume)
            .field("remaining", &self.remaining)
            .field("flags", &format_args!("{:#06x}", self.flags))
            .field("links", &self.links)
            .finish()
    }
}

/// Cold-data slab with its own index free list.
struct AuxSlab {
    cold: Vec<u8>,
    cold_size: usize,
    next_free: Vec<SlotIndex>,
    free_head: SlotIndex,
}

impl AuxSlab {
    #[inline]
    fn pop(&mut self) -> Option<SlotIndex> {
        if self.free_head == NULL_SLOT {
            return None;
        }
        let index = self.free_head;
        self.free_head = self.next_free[index as usize];
        self.next_free[index as usize] = NULL_SLOT;
        Some(index)
    }

    #[inline]
    fn push(&mut self, index: SlotIndex) {
        self.next_free[index as usize] = self.free_head;
        self.free_head = index;
    }

    #[inline]
    fn region(&self, index: SlotIndex) -> std::ops::Range<usize> {
        let start = index as usize * self.cold_size;
        start..start + self.cold_size
    }
}

/// Pre-allocated dual slab with O(1) allocation and deallocation.
///
/// The primary free list is threaded through the `Free` link of unused
/// slots; no system calls or locks in the hot path.
pub struct Arena {
    /// Contiguous block of pre-allocated slots
    slots: Vec<Slot>,

    /// `hot_size` bytes per slot, same index
    hot: Vec<u8>,
    hot_size: usize,

    /// Free slots of the primary slab
    free: QueueState,

    aux: AuxSlab,

    /// Number of currently allocated slots
    allocated_count: u32,

    /// Total capacity
    capacity: u32,
}

fn reserve<T: Clone>(len: usize, fill: T) -> Result<Vec<T>, ArenaError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| ArenaError::AllocFailed {
        bytes: len.saturating_mul(std::mem::size_of::<T>()),
    })?;
    v.resize(len, fill);
    Ok(v)
}

impl Arena {
    /// Create a new arena with the specified capacity and data sizes.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of slots (orders plus price levels)
    /// * `hot_size` - Bytes of caller data colocated with each slot
    /// * `cold_size` - Bytes of caller data in the aux slab per slot
    pub fn new(capacity: u32, hot_size: usize, cold_size: usize) -> Result<Self, ArenaError> {
        if capacity == 0 || capacity >= NULL_SLOT {
            return Err(ArenaError::InvalidConfig(format!(
                "capacity must be in 1..{NULL_SLOT}, got {capacity}"
            )));
        }
        if hot_size > u16::MAX as usize || cold_size > u16::MAX as usize {
            return Err(ArenaError::InvalidConfig(format!(
                "hot/cold sizes must fit in 16 bits, got {hot_size}/{cold_size}"
            )));
        }

        let cap = capacity as usize;
        let mut slots = reserve(cap, Slot::empty())?;
        let hot = reserve(cap * hot_size, 0u8)?;
        let cold = reserve(cap * cold_size, 0u8)?;
        let mut next_free = reserve(cap, NULL_SLOT)?;

        // Thread both free lists so index 0 is handed out first.
        let mut free = QueueState::new();
        for i in 0..capacity {
            free.push_back(&mut slots, i, Role::Free);
        }
        for i in 0..capacity - 1 {
            next_free[i as usize] = i + 1;
        }

        Ok(Self {
            slots,
            hot,
            hot_size,
            free,
            aux: AuxSlab {
                cold,
                cold_size,
                next_free,
                free_head: 0,
            },
            allocated_count: 0,
            capacity,
        })
    }

    /// Allocate a slot from both slabs.
    ///
    /// The slot and its data regions are zeroed here rather than on
    /// free, so slots that are never reused cost nothing.
    ///
    /// # Complexity
    /// O(1) plus the data clear
    #[inline]
    pub fn allocate(&mut self) -> Result<SlotIndex, ArenaError> {
        let index = self
            .free
            .pop_front(&mut self.slots, Role::Free)
            .ok_or(ArenaError::Exhausted)?;

        match self.aux.pop() {
            Some(aux_index) if aux_index == index => {}
            other => {
                // Undo the primary pop so neither slab is left split.
                if let Some(aux_index) = other {
                    self.aux.push(aux_index);
                }
                self.free.push_front(&mut self.slots, index, Role::Free);
                return Err(ArenaError::SlabDesync {
                    primary: index,
                    aux: other.unwrap_or(NULL_SLOT),
                });
            }
        }

        self.slots[index as usize] = Slot::empty();
        let hot = self.hot_region(index);
        self.hot[hot].fill(0);
        let cold = self.aux.region(index);
        self.aux.cold[cold].fill(0);

        self.allocated_count += 1;
        Ok(index)
    }

    /// Free a slot back to both slabs.
    ///
    /// Every link of the slot is cleared so no stale membership survives.
    /// The caller must have unlinked the slot from all of its lists.
    ///
    /// # Complexity
    /// O(1) - pushes to head of both free lists
    #[inline]
    pub fn free(&mut self, index: SlotIndex) -> Result<(), ArenaError> {
        if index >= self.capacity || self.is_free(index) {
            return Err(ArenaError::InvalidSlot(index));
        }

        self.slots[index as usize].links = [Link::NULL; ROLE_COUNT];
        self.free.push_front(&mut self.slots, index, Role::Free);
        self.aux.push(index);
        self.allocated_count -= 1;
        Ok(())
    }

    /// Free-list members have a predecessor, except the head itself.
    #[inline]
    fn is_free(&self, index: SlotIndex) -> bool {
        self.free.head == index || self.slots[index as usize].link(Role::Free).prev != NULL_SLOT
    }

    #[inline]
    fn hot_region(&self, index: SlotIndex) -> std::ops::Range<usize> {
        let start = index as usize * self.hot_size;
        start..start + self.hot_size
    }

    /// Get an immutable reference to a slot.
    #[inline]
    pub fn slot(&self, index: SlotIndex) -> &Slot {
        debug_assert!(index < self.capacity, "Index out of bounds");
        &self.slots[index as usize]
    }

    /// Get a mutable reference to a slot.
    #[inline]
    pub fn slot_mut(&mut self, index: SlotIndex) -> &mut Slot {
        debug_assert!(index < self.capacity, "Index out of bounds");
        &mut self.slots[index as usize]
    }

    /// All slots, for the queue functions.
    #[inline]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    #[inline]
    pub fn slots_mut(&mut self) -> &mut [Slot] {
        &mut self.slots
    }

    /// Hot data of a slot.
    #[inline]
    pub fn data(&self, index: SlotIndex) -> &[u8] {
        &self.hot[self.hot_region(index)]
    }

    #[inline]
    pub fn data_mut(&mut self, index: SlotIndex) -> &mut [u8] {
        let range = self.hot_region(index);
        &mut self.hot[range]
    }

    /// Cold data of a slot.
    #[inline]
    pub fn aux_data(&self, index: SlotIndex) -> &[u8] {
        &self.aux.cold[self.aux.region(index)]
    }

    #[inline]
    pub fn aux_data_mut(&mut self, index: SlotIndex) -> &mut [u8] {
        let range = self.aux.region(index);
        &mut self.aux.cold[range]
    }

    #[inline]
    pub fn hot_size(&self) -> usize {
        self.hot_size
    }

    #[inline]
    pub fn cold_size(&self) -> usize {
        self.aux.cold_size
    }

    /// Returns the number of currently allocated slots.
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.allocated_count
    }

    /// Returns the number of free slots.
    #[inline]
    pub fn available(&self) -> u32 {
        self.capacity - self.allocated_count
    }

    /// Returns the total capacity of the arena.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Returns true if the arena is empty (no allocated slots).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated_count == 0
    }

    /// Returns true if the arena is full (no free slots).
    #[inline]
    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Pre-fault all memory pages (warm-up routine).
    ///
    /// The zeroed data regions come from lazily mapped pages; touching
    /// them now keeps page faults out of the hot path.
    pub fn warm_up(&mut self) {
        std::hint::black_box(&mut self.hot[..]).fill(0);
        std::hint::black_box(&mut self.aux.cold[..]).fill(0);
        for slot in &self.slots {
            std::hint::black_box(slot);
        }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity)
            .field("allocated", &self.allocated_count)
            .field("hot_size", &self.hot_size)
            .field("cold_size", &self.aux.cold_size)
            .field("free_head", &self.free.head)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_size() {
        assert_eq!(std::mem::size_of::<Slot>(), 64);
        assert_eq!(std::mem::align_of::<Slot>(), 64);
    }

    #[test]
    fn test_arena_creation() {
        let arena = Arena::new(100, 16, 32).unwrap();
        assert_eq!(arena.capacity(), 100);
        assert_eq!(arena.allocated(), 0);
        assert_eq!(arena.available(), 100);
        assert!(!arena.is_full());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_arena_rejects_bad_config() {
        assert!(matches!(Arena::new(0, 0, 0), Err(ArenaError::InvalidConfig(_))));
        assert!(matches!(
            Arena::new(10, 70_000, 0),
            Err(ArenaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_arena_alloc_free() {
        let mut arena = Arena::new(3, 0, 0).unwrap();

        // Allocate all slots
        let idx0 = arena.allocate().expect("Should allocate");
        let idx1 = arena.allocate().expect("Should allocate");
        let idx2 = arena.allocate().expect("Should allocate");
        assert_eq!((idx0, idx1, idx2), (0, 1, 2));

        assert_eq!(arena.allocated(), 3);
        assert!(arena.is_full());
        assert_eq!(arena.allocate(), Err(ArenaError::Exhausted));

        // Free one
        arena.free(idx1).unwrap();
        assert_eq!(arena.allocated(), 2);
        assert!(!arena.is_full());

        // Allocate again (should reuse idx1's slot)
        let idx3 = arena.allocate().expect("Should allocate");
        assert_eq!(idx3, idx1, "Should reuse freed slot");

        // Free all
        arena.free(idx0).unwrap();
        arena.free(idx2).unwrap();
        arena.free(idx3).unwrap();
        assert!(arena.is_empty());
    }

    #[test]
    fn test_free_out_of_range() {
        let mut arena = Arena::new(2, 0, 0).unwrap();
        assert_eq!(arena.free(5), Err(ArenaError::InvalidSlot(5)));
    }

    #[test]
    fn test_double_free_rejected() {
        let mut arena = Arena::new(3, 0, 0).unwrap();
        let a = arena.allocate().unwrap();
        let b = arena.allocate().unwrap();

        // Never-allocated tail of the free list
        assert_eq!(arena.free(2), Err(ArenaError::InvalidSlot(2)));

        arena.free(a).unwrap();
        assert_eq!(arena.free(a), Err(ArenaError::InvalidSlot(a)));
        arena.free(b).unwrap();
        // `a` is no longer the head but is still free
        assert_eq!(arena.free(a), Err(ArenaError::InvalidSlot(a)));
        assert_eq!(arena.allocated(), 0);
    }

    #[test]
    fn test_free_clears_links() {
        let mut arena = Arena::new(4, 0, 0).unwrap();
        let idx = arena.allocate().unwrap();
        arena.slot_mut(idx).links[Role::Fifo as usize] = Link { next: 2, prev: 3 };
        arena.slot_mut(idx).links[Role::Org as usize] = Link { next: 1, prev: 1 };

        arena.free(idx).unwrap();

        let slot = arena.slot(idx);
        assert_eq!(slot.link(Role::Fifo), Link::NULL);
        assert_eq!(slot.link(Role::Org), Link::NULL);
        assert_eq!(slot.link(Role::Ladder), Link::NULL);
    }

    #[test]
    fn test_data_regions_are_cleared_on_allocate() {
        let mut arena = Arena::new(2, 8, 16).unwrap();
        let idx = arena.allocate().unwrap();

        arena.data_mut(idx).copy_from_slice(&[0xAB; 8]);
        arena.aux_data_mut(idx).copy_from_slice(&[0xCD; 16]);
        arena.slot_mut(idx).price = 123;
        assert_eq!(arena.data(idx), &[0xAB; 8]);
        assert_eq!(arena.aux_data(idx), &[0xCD; 16]);

        arena.free(idx).unwrap();
        let again = arena.allocate().unwrap();
        assert_eq!(again, idx);
        assert_eq!(arena.data(again), &[0u8; 8]);
        assert_eq!(arena.aux_data(again), &[0u8; 16]);
        assert_eq!(arena.slot(again).price, 0);
    }

    #[test]
    fn test_data_regions_do_not_overlap() {
        let mut arena = Arena::new(3, 4, 2).unwrap();
        let a = arena.allocate().unwrap();
        let b = arena.allocate().unwrap();

        arena.data_mut(a).fill(1);
        arena.data_mut(b).fill(2);
        arena.aux_data_mut(a).fill(3);
        arena.aux_data_mut(b).fill(4);

        assert_eq!(arena.data(a), &[1; 4]);
        assert_eq!(arena.data(b), &[2; 4]);
        assert_eq!(arena.aux_data(a), &[3; 2]);
        assert_eq!(arena.aux_data(b), &[4; 2]);
    }

    #[test]
    fn test_slabs_stay_in_step_through_churn() {
        let mut arena = Arena::new(8, 1, 1).unwrap();
        let mut live = Vec::new();
        for round in 0..50u32 {
            if round % 3 == 2 {
                if let Some(idx) = live.pop() {
                    arena.free(idx).unwrap();
                }
            } else if let Ok(idx) = arena.allocate() {
                live.push(idx);
            }
        }
        assert_eq!(arena.allocated() as usize, live.len());
    }

    #[test]
    fn test_arena_warm_up() {
        let mut arena = Arena::new(1000, 8, 8).unwrap();
        arena.warm_up(); // Should not panic
    }
}

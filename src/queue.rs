//! Intrusive Queue Set - doubly-linked lists threaded through slot links.
//!
//! Every slot carries one `Link` per `Role`, so the same slot can sit in
//! the free list, a price ladder, a time FIFO and an org queue at once
//! without any node allocation. All operations touch only the immediate
//! neighbours and run in O(1).
//!
//! Two list shapes are supported:
//!
//! - **Linear** lists terminated by `NULL_SLOT`, with head/tail kept
//!   outside the slots in a [`QueueState`] (free list, org queues) or in
//!   a bare head pointer (price ladders).
//! - **Rings** anchored at a sentinel slot (a price level). The anchor's
//!   `next` is the oldest member and its `prev` the newest, so removing a
//!   member needs no external state at all.

use crate::arena::{Link, Role, Slot, SlotIndex, NULL_SLOT};

#[inline]
fn link(slots: &[Slot], index: SlotIndex, role: Role) -> Link {
    slots[index as usize].links[role as usize]
}

#[inline]
fn link_mut(slots: &mut [Slot], index: SlotIndex, role: Role) -> &mut Link {
    &mut slots[index as usize].links[role as usize]
}

/// Splice `new` in directly after `anchor`.
#[inline]
pub fn link_after(slots: &mut [Slot], anchor: SlotIndex, new: SlotIndex, role: Role) {
    let next = link(slots, anchor, role).next;

    *link_mut(slots, new, role) = Link { next, prev: anchor };
    link_mut(slots, anchor, role).next = new;
    if next != NULL_SLOT {
        link_mut(slots, next, role).prev = new;
    }
}

/// Splice `new` in directly before `anchor`.
#[inline]
pub fn link_before(slots: &mut [Slot], anchor: SlotIndex, new: SlotIndex, role: Role) {
    let prev = link(slots, anchor, role).prev;

    *link_mut(slots, new, role) = Link { next: anchor, prev };
    link_mut(slots, anchor, role).prev = new;
    if prev != NULL_SLOT {
        link_mut(slots, prev, role).next = new;
    }
}

/// Detach `slot` from whatever list it is in for `role`.
///
/// Returns the slot's former neighbours. The caller fixes any external
/// head/tail pointer that referenced the slot.
#[inline]
pub fn unlink(slots: &mut [Slot], slot: SlotIndex, role: Role) -> Link {
    let old = link(slots, slot, role);

    if old.prev != NULL_SLOT {
        link_mut(slots, old.prev, role).next = old.next;
    }
    if old.next != NULL_SLOT {
        link_mut(slots, old.next, role).prev = old.prev;
    }
    *link_mut(slots, slot, role) = Link::NULL;

    old
}

// ============================================================================
// Rings
// ============================================================================

/// Make `anchor` an empty ring.
#[inline]
pub fn ring_init(slots: &mut [Slot], anchor: SlotIndex, role: Role) {
    *link_mut(slots, anchor, role) = Link {
        next: anchor,
        prev: anchor,
    };
}

#[inline]
pub fn ring_is_empty(slots: &[Slot], anchor: SlotIndex, role: Role) -> bool {
    link(slots, anchor, role).next == anchor
}

/// Append `slot` as the newest ring member.
#[inline]
pub fn ring_push_back(slots: &mut [Slot], anchor: SlotIndex, slot: SlotIndex, role: Role) {
    link_before(slots, anchor, slot, role);
}

/// Oldest ring member, if any.
#[inline]
pub fn ring_front(slots: &[Slot], anchor: SlotIndex, role: Role) -> Option<SlotIndex> {
    let next = link(slots, anchor, role).next;
    (next != anchor).then_some(next)
}

/// Members of the ring anchored at `anchor`, oldest first.
pub fn ring_iter(slots: &[Slot], anchor: SlotIndex, role: Role) -> Iter<'_> {
    Iter {
        slots,
        cursor: link(slots, anchor, role).next,
        stop: anchor,
        role,
    }
}

// ============================================================================
// Linear lists
// ============================================================================

/// Walk a linear list from `start` until the null slot.
pub fn iter(slots: &[Slot], start: SlotIndex, role: Role) -> Iter<'_> {
    Iter {
        slots,
        cursor: start,
        stop: NULL_SLOT,
        role,
    }
}

/// Forward iterator over slot indices in one list.
pub struct Iter<'a> {
    slots: &'a [Slot],
    cursor: SlotIndex,
    stop: SlotIndex,
    role: Role,
}

impl Iterator for Iter<'_> {
    type Item = SlotIndex;

    #[inline]
    fn next(&mut self) -> Option<SlotIndex> {
        if self.cursor == self.stop || self.cursor == NULL_SLOT {
            return None;
        }
        let current = self.cursor;
        self.cursor = link(self.slots, current, self.role).next;
        Some(current)
    }
}

/// Head/tail bookkeeping for a linear intrusive list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueState {
    /// Oldest member (first to pop)
    pub head: SlotIndex,
    /// Newest member
    pub tail: SlotIndex,
    /// Number of members
    pub len: u32,
}

impl Default for QueueState {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueState {
    pub const fn new() -> Self {
        Self {
            head: NULL_SLOT,
            tail: NULL_SLOT,
            len: 0,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a slot to the tail.
    #[inline]
    pub fn push_back(&mut self, slots: &mut [Slot], index: SlotIndex, role: Role) {
        if self.tail == NULL_SLOT {
            debug_assert!(self.head == NULL_SLOT);
            *link_mut(slots, index, role) = Link::NULL;
            self.head = index;
        } else {
            link_after(slots, self.tail, index, role);
        }
        self.tail = index;
        self.len += 1;
    }

    /// Prepend a slot to the head.
    #[inline]
    pub fn push_front(&mut self, slots: &mut [Slot], index: SlotIndex, role: Role) {
        if self.head == NULL_SLOT {
            debug_assert!(self.tail == NULL_SLOT);
            *link_mut(slots, index, role) = Link::NULL;
            self.tail = index;
        } else {
            link_before(slots, self.head, index, role);
        }
        self.head = index;
        self.len += 1;
    }

    /// Remove and return the head slot.
    #[inline]
    pub fn pop_front(&mut self, slots: &mut [Slot], role: Role) -> Option<SlotIndex> {
        if self.head == NULL_SLOT {
            return None;
        }
        let index = self.head;
        self.remove(slots, index, role);
        Some(index)
    }

    /// Remove a slot from anywhere in the list.
    ///
    /// Returns `true` if the list is now empty.
    #[inline]
    pub fn remove(&mut self, slots: &mut [Slot], index: SlotIndex, role: Role) -> bool {
        let old = unlink(slots, index, role);

        if old.prev == NULL_SLOT {
            debug_assert!(self.head == index);
            self.head = old.next;
        }
        if old.next == NULL_SLOT {
            debug_assert!(self.tail == index);
            self.tail = old.prev;
        }
        self.len -= 1;

        self.len == 0
    }

    /// Members from head to tail.
    pub fn iter<'a>(&self, slots: &'a [Slot], role: Role) -> Iter<'a> {
        iter(slots, self.head, role)
    }
}

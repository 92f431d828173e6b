//! Stress Tests - Push the book to its limits.
//!
//! These tests verify correctness under extreme conditions:
//! - Near-capacity operation and slot exhaustion
//! - High contention at single price levels
//! - Rapid order churn
//! - Maximum values for prices and quantities
//! - Link integrity of every intrusive list after heavy mutation

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use slab_lob::{
    BookError, Command, Engine, EngineError, MatchRecord, NewOrder, OrderBook, Outcome, Role, Side,
    NULL_SLOT,
};

/// Walk every ladder and FIFO and check that next/prev agree.
///
/// Returns the number of orders linked into levels.
fn check_links(book: &OrderBook, products: u16) -> usize {
    let slots = book.arena().slots();
    let mut linked = 0;

    for product in 0..products {
        for side in [Side::Bid, Side::Ask] {
            let Some(best) = book.best_price(product, side) else {
                continue;
            };
            let mut level = book.level_at(product, side, best).unwrap();
            assert_eq!(slots[level as usize].link(Role::Ladder).prev, NULL_SLOT);

            let mut last_price = None;
            while level != NULL_SLOT {
                let sentinel = &slots[level as usize];
                assert!(sentinel.is_level(), "ladder entry {level} is not a level");
                if let Some(last) = last_price {
                    assert!(side.is_better(last, sentinel.price), "ladder out of order");
                }
                last_price = Some(sentinel.price);

                // FIFO ring: every hop must be mirrored by the prev link
                let mut cursor = level;
                let mut len = 0;
                loop {
                    let next = slots[cursor as usize].link(Role::Fifo).next;
                    assert_eq!(slots[next as usize].link(Role::Fifo).prev, cursor);
                    if next == level {
                        break;
                    }
                    let order = &slots[next as usize];
                    assert_eq!(order.price, sentinel.price);
                    assert!(!order.is_inactive());
                    len += 1;
                    cursor = next;
                }
                assert!(len > 0, "empty level {level} left in ladder");
                linked += len;

                let next = sentinel.link(Role::Ladder).next;
                if next != NULL_SLOT {
                    assert_eq!(slots[next as usize].link(Role::Ladder).prev, level);
                }
                level = next;
            }
        }
    }

    assert_eq!(
        book.arena().allocated() as usize,
        book.order_count() + book.level_count(),
        "slots leaked"
    );
    linked
}

fn place(engine: &mut Engine, side: Side, price: u64, qty: u32) -> Result<u64, EngineError> {
    engine
        .place(0, &NewOrder::limit(1, side, price, qty), &[], &[])
        .map(|handle| handle.order_id)
}

// ============================================================================
// Capacity Stress Tests
// ============================================================================

#[test]
fn test_near_capacity_operation() {
    const CAPACITY: u32 = 10_000;
    let mut engine = Engine::in_memory(CAPACITY, 1, 0, 0).unwrap();

    // Leave room for 200 level sentinels
    let target_orders = (CAPACITY as u64 - 200) * 95 / 100;

    for i in 0..target_orders {
        // Use non-overlapping prices: bids 8000-8990, asks 10000-10990
        let (side, price) = if i % 2 == 0 {
            (Side::Bid, 8000 + (i % 100) * 10)
        } else {
            (Side::Ask, 10000 + (i % 100) * 10)
        };
        let result = place(&mut engine, side, price, 100);
        assert!(result.is_ok(), "Order {} should be accepted, got {:?}", i, result);
    }

    assert_eq!(engine.order_count(), target_orders as usize);
    assert_eq!(check_links(engine.book(), 1), target_orders as usize);
}

#[test]
fn test_arena_full_rejection() {
    const CAPACITY: u32 = 100;
    let mut engine = Engine::in_memory(CAPACITY, 1, 0, 0).unwrap();

    // One level sentinel plus 99 orders fills the arena
    for _ in 0..CAPACITY - 1 {
        place(&mut engine, Side::Bid, 100, 10).unwrap();
    }
    assert!(engine.book().arena().is_full());

    // Same level: needs one slot, none left
    let result = place(&mut engine, Side::Bid, 100, 10);
    assert!(matches!(result, Err(EngineError::Book(BookError::Exhausted))));

    // New level: needs two
    let result = place(&mut engine, Side::Ask, 200, 10);
    assert!(matches!(result, Err(EngineError::Book(BookError::Exhausted))));

    // The failed attempts did not burn IDs or leave anything behind
    assert_eq!(engine.book().next_order_id(), CAPACITY as u64);
    assert_eq!(engine.order_count(), (CAPACITY - 1) as usize);
    check_links(engine.book(), 1);
}

#[test]
fn test_new_level_needs_two_free_slots() {
    let mut engine = Engine::in_memory(3, 1, 0, 0).unwrap();

    place(&mut engine, Side::Bid, 100, 10).unwrap();
    assert_eq!(engine.book().arena().available(), 1);

    // Joining the level fits, opening another one would not
    assert!(matches!(
        place(&mut engine, Side::Bid, 101, 10),
        Err(EngineError::Book(BookError::Exhausted))
    ));
    place(&mut engine, Side::Bid, 100, 10).unwrap();
    assert!(engine.book().arena().is_full());
}

#[test]
fn test_arena_reuse_after_cancel() {
    const CAPACITY: u32 = 100;
    let mut engine = Engine::in_memory(CAPACITY, 1, 0, 0).unwrap();

    let ids: Vec<u64> = (0..CAPACITY - 1)
        .map(|_| place(&mut engine, Side::Bid, 100, 10).unwrap())
        .collect();
    assert!(engine.book().arena().is_full());

    // Cancel half
    for order_id in ids.iter().step_by(2) {
        engine.cancel(*order_id).unwrap();
    }

    // Should be able to place more now
    for _ in 0..ids.len() / 2 {
        place(&mut engine, Side::Bid, 100, 10).unwrap();
    }
    check_links(engine.book(), 1);
}

// ============================================================================
// High Contention Tests
// ============================================================================

#[test]
fn test_single_price_level_contention() {
    let mut engine = Engine::in_memory(20_000, 1, 0, 0).unwrap();

    // All orders at the same price
    for _ in 0..10_000 {
        place(&mut engine, Side::Ask, 10_000, 1).unwrap();
    }

    let book = engine.book();
    assert_eq!(book.level_count(), 1);
    assert_eq!(book.volume_at_price(0, Side::Ask, 10_000), 10_000);

    // One maker at a time is filled off the front
    let front: Vec<u64> = book.orders_at_price(0, Side::Ask, 10_000)[..5000].to_vec();
    for maker_id in front {
        let outcome = engine
            .process_command(Command::Match(MatchRecord::new(maker_id, 0, 10_000, 1, 0)))
            .unwrap();
        assert!(matches!(outcome, Outcome::Matched(m) if m.maker.is_complete() && m.taker.is_none()));
    }

    assert_eq!(engine.order_count(), 5000);
    assert_eq!(engine.book().volume_at_price(0, Side::Ask, 10_000), 5000);
    check_links(engine.book(), 1);
}

#[test]
fn test_fifo_priority_under_contention() {
    let mut engine = Engine::in_memory(1000, 1, 0, 0).unwrap();

    let ids: Vec<u64> = (0..100)
        .map(|_| place(&mut engine, Side::Ask, 10_000, 10).unwrap())
        .collect();

    // Cancel a scattering from the middle; survivors keep their order
    for order_id in ids.iter().skip(1).step_by(7) {
        engine.cancel(*order_id).unwrap();
    }
    let survivors: Vec<u64> = ids
        .iter()
        .enumerate()
        .filter(|(i, _)| *i == 0 || (i - 1) % 7 != 0)
        .map(|(_, id)| *id)
        .collect();
    assert_eq!(engine.book().orders_at_price(0, Side::Ask, 10_000), survivors);

    // A parked order rejoins at the back
    engine.deactivate(survivors[0]).unwrap();
    engine.activate(survivors[0]).unwrap();
    let queue = engine.book().orders_at_price(0, Side::Ask, 10_000);
    assert_eq!(queue.last(), Some(&survivors[0]));
    assert_eq!(queue[0], survivors[1]);
}

// ============================================================================
// Rapid Churn Tests
// ============================================================================

#[test]
fn test_rapid_add_cancel_cycles() {
    let mut engine = Engine::in_memory(1000, 1, 0, 0).unwrap();

    // Rapidly add and cancel orders
    for cycle in 0..1000u64 {
        let order_id = place(&mut engine, Side::Bid, 10_000 + cycle % 10, 100).unwrap();
        engine.cancel(order_id).unwrap();
    }

    assert_eq!(engine.order_count(), 0);
    assert_eq!(engine.book().level_count(), 0);
    assert!(engine.book().arena().is_empty());
}

#[test]
fn test_random_churn_keeps_links_intact() {
    const PRODUCTS: u16 = 4;
    let mut rng = ChaCha8Rng::seed_from_u64(0xC0FFEE);
    let mut book = OrderBook::new(5_000, PRODUCTS as usize, 16, 32).unwrap();
    let mut live: Vec<u64> = Vec::new();

    for step in 0..20_000 {
        let roll = rng.gen_range(0..10);
        if live.is_empty() || (roll < 5 && book.arena().available() >= 2) {
            let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
            let order = NewOrder::limit(rng.gen_range(0..16), side, rng.gen_range(1..64), rng.gen_range(1..10));
            let handle = book.place(rng.gen_range(0..PRODUCTS), &order).unwrap();
            live.push(handle.order_id);
        } else if roll < 8 {
            let order_id = live.swap_remove(rng.gen_range(0..live.len()));
            book.cancel(order_id).unwrap();
        } else {
            let order_id = live[rng.gen_range(0..live.len())];
            if book.order(order_id).unwrap().is_inactive() {
                book.activate(order_id).unwrap();
            } else {
                book.deactivate(order_id).unwrap();
            }
        }

        if step % 500 == 0 {
            check_links(&book, PRODUCTS);
        }
    }

    let linked = check_links(&book, PRODUCTS);
    let parked = live
        .iter()
        .filter(|id| book.order(**id).unwrap().is_inactive())
        .count();
    assert_eq!(linked + parked, live.len());
}

#[test]
fn test_rapid_match_cycles() {
    let mut engine = Engine::in_memory(1000, 1, 0, 0).unwrap();

    for _ in 0..1000 {
        let maker = place(&mut engine, Side::Ask, 10_000, 100).unwrap();
        let taker = place(&mut engine, Side::Bid, 9_000, 100).unwrap();

        let outcome = engine
            .apply_match(&MatchRecord::new(maker, taker, 10_000, 100, 0))
            .unwrap();
        assert!(outcome.maker.is_complete());
        assert!(outcome.taker.is_some_and(|fill| fill.is_complete()));
    }

    // Book should be empty after all matches
    assert_eq!(engine.order_count(), 0);
    assert!(engine.book().arena().is_empty());
}

// ============================================================================
// Edge Case Tests
// ============================================================================

#[test]
fn test_zero_price() {
    let mut engine = Engine::in_memory(100, 1, 0, 0).unwrap();

    place(&mut engine, Side::Bid, 0, 100).unwrap();
    assert_eq!(engine.book().best_bid(0), Some(0));
}

#[test]
fn test_max_price() {
    let mut engine = Engine::in_memory(100, 1, 0, 0).unwrap();

    place(&mut engine, Side::Ask, u64::MAX, 100).unwrap();
    place(&mut engine, Side::Ask, u64::MAX - 1, 100).unwrap();
    assert_eq!(engine.book().best_ask(0), Some(u64::MAX - 1));
}

#[test]
fn test_max_quantity() {
    let mut engine = Engine::in_memory(100, 1, 0, 0).unwrap();

    place(&mut engine, Side::Bid, 100, u32::MAX).unwrap();
    place(&mut engine, Side::Bid, 100, u32::MAX).unwrap();

    // Level volume is summed in 64 bits
    assert_eq!(engine.book().volume_at_price(0, Side::Bid, 100), 2 * u32::MAX as u64);
}

#[test]
fn test_zero_quantity_rejected() {
    let mut engine = Engine::in_memory(100, 1, 0, 0).unwrap();

    let result = place(&mut engine, Side::Bid, 100, 0);
    assert!(matches!(result, Err(EngineError::Book(BookError::InvalidQuantity(_)))));
    assert!(engine.book().is_empty());
    assert_eq!(engine.book().next_order_id(), 1);
}

#[test]
fn test_many_price_levels() {
    let mut engine = Engine::in_memory(10_000, 1, 0, 0).unwrap();

    // Create orders at 1000 different prices, inserted worst-first
    for i in 0..1000u64 {
        place(&mut engine, Side::Bid, 10_000 + i, 10).unwrap();
    }

    let book = engine.book();
    assert_eq!(book.level_count(), 1000);
    assert_eq!(book.best_bid(0), Some(10_999));
    let top = book.top_levels::<3>(0, Side::Bid);
    let prices: Vec<u64> = top.iter().map(|level| level.price).collect();
    assert_eq!(prices, vec![10_999, 10_998, 10_997]);
    assert_eq!(check_links(book, 1), 1000);
}

#[test]
fn test_many_products() {
    const PRODUCTS: usize = 256;
    let mut engine = Engine::in_memory(10_000, PRODUCTS, 0, 0).unwrap();

    for product in 0..PRODUCTS as u16 {
        engine
            .place(product, &NewOrder::limit(1, Side::Bid, 100 + product as u64, 1), &[], &[])
            .unwrap();
    }

    for product in 0..PRODUCTS as u16 {
        assert_eq!(engine.book().best_bid(product), Some(100 + product as u64));
        assert_eq!(engine.book().best_ask(product), None);
    }

    let result = engine.place(PRODUCTS as u16, &NewOrder::limit(1, Side::Bid, 100, 1), &[], &[]);
    assert!(matches!(result, Err(EngineError::Book(BookError::UnknownProduct(_)))));
}

// ============================================================================
// Cancel Edge Cases
// ============================================================================

#[test]
fn test_double_cancel() {
    let mut engine = Engine::in_memory(100, 1, 0, 0).unwrap();

    let order_id = place(&mut engine, Side::Bid, 100, 10).unwrap();
    engine.cancel(order_id).unwrap();

    let result = engine.cancel(order_id);
    assert!(matches!(result, Err(EngineError::Book(BookError::OrderNotFound(id))) if id == order_id));
}

#[test]
fn test_cancel_during_partial_fill() {
    let mut engine = Engine::in_memory(100, 1, 0, 0).unwrap();

    let maker = place(&mut engine, Side::Ask, 100, 100).unwrap();
    engine.apply_match(&MatchRecord::new(maker, 0, 100, 30, 0)).unwrap();

    let removed = engine.cancel(maker).unwrap();
    assert_eq!(removed.remaining, 70);
    assert!(engine.book().arena().is_empty());
}

#[test]
fn test_cancel_parked_order() {
    let mut engine = Engine::in_memory(100, 1, 0, 0).unwrap();

    let order_id = place(&mut engine, Side::Ask, 100, 10).unwrap();
    engine.deactivate(order_id).unwrap();
    // Parking the only order empties and frees its level
    assert_eq!(engine.book().level_count(), 0);

    engine.cancel(order_id).unwrap();
    assert!(engine.book().arena().is_empty());
}

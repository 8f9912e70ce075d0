//! Timestamp channel acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - Records come out in push order
//! - A channel of capacity N holds N - 1 records; the next push is refused
//!   and hands the record back
//! - Popping one record frees exactly one slot
//! - Under concurrent use with no overflow, every pushed record is popped
//!   exactly once, in order

use super::common::ts;
use hwts_common::TimestampRecord;
use hwts_pipeline::{channel, Full};
use std::thread;

#[test]
fn test_ordering_and_conversion() {
    let (mut tx, mut rx) = channel::<TimestampRecord>(4).unwrap();
    let a = ts(1, 0);
    let b = ts(1, 100);
    let c = ts(2, 0);

    tx.try_push(a).unwrap();
    tx.try_push(b).unwrap();
    tx.try_push(c).unwrap();

    let out: Vec<u64> = rx.drain().map(|r| r.as_nanos()).collect();
    assert_eq!(out, vec![1_000_000_000, 1_000_000_100, 2_000_000_000]);
    assert_eq!(rx.try_pop(), None);
}

#[test]
fn test_overflow_then_recovery() {
    let (mut tx, mut rx) = channel::<TimestampRecord>(4).unwrap();
    for s in 1..=3 {
        tx.try_push(ts(s, 0)).unwrap();
    }

    let fourth = ts(4, 0);
    assert_eq!(tx.try_push(fourth), Err(Full(fourth)));
    assert_eq!(tx.len(), 3);

    assert_eq!(rx.try_pop(), Some(ts(1, 0)));
    tx.try_push(fourth).unwrap();

    let rest: Vec<_> = rx.drain().collect();
    assert_eq!(rest, vec![ts(2, 0), ts(3, 0), fourth]);
}

#[test]
fn test_default_capacity_holds_1023() {
    let (mut tx, rx) = channel::<TimestampRecord>(1024).unwrap();
    for i in 0..1023u32 {
        tx.try_push(ts(0, i)).unwrap();
    }
    assert!(tx.try_push(ts(9, 9)).is_err());
    assert_eq!(rx.len(), 1023);
}

#[test]
fn test_invalid_capacities_rejected() {
    for capacity in [0, 1, 3, 1000] {
        assert!(
            channel::<TimestampRecord>(capacity).is_err(),
            "capacity {capacity} accepted"
        );
    }
}

#[test]
fn test_concurrent_transfer_preserves_order() {
    const COUNT: u32 = 100_000;
    let (mut tx, mut rx) = channel::<TimestampRecord>(64).unwrap();

    let producer = thread::spawn(move || {
        for i in 0..COUNT {
            let mut record = ts(u64::from(i), 0);
            // Retry on full so nothing is dropped
            while let Err(Full(back)) = tx.try_push(record) {
                record = back;
                std::hint::spin_loop();
            }
        }
    });

    let mut expected = 0u32;
    while expected < COUNT {
        if let Some(record) = rx.try_pop() {
            assert_eq!(record.seconds(), u64::from(expected));
            expected += 1;
        } else {
            std::hint::spin_loop();
        }
    }

    producer.join().unwrap();
    assert!(rx.is_empty());
    assert!(rx.is_producer_closed());
}

//! Stress tests for OrderedContainer implementations.
//!
//! These tests verify concurrent correctness under high contention.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use super::{payload_for, TestKey};
use crate::data_structures::OrderedContainer;

fn key<C: OrderedContainer<usize>>(index: u32) -> C::Key
where
    C::Key: TestKey,
{
    <C::Key as TestKey>::from_index(index)
}

/// Test producers and consumers running together: every inserted entry is
/// extracted exactly once with its own payload
pub fn test_producers_consumers<C>()
where
    C: OrderedContainer<usize> + Default + Send + Sync + 'static,
    C::Key: TestKey,
{
    let container = Arc::new(C::default());
    let producers = 4u32;
    let consumers = 4;
    let items_per_producer = 2000u32;
    let produced_done = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(producers as usize + consumers));

    let producer_handles: Vec<_> = (0..producers)
        .map(|p| {
            let container = Arc::clone(&container);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..items_per_producer {
                    let index = i * producers + p;
                    while container.insert(key::<C>(index), payload_for(index)).is_err() {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let consumer_handles: Vec<_> = (0..consumers)
        .map(|_| {
            let container = Arc::clone(&container);
            let done = Arc::clone(&produced_done);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut taken = Vec::new();
                loop {
                    let finished = done.load(Ordering::Acquire);
                    match container.extract_minimum() {
                        Some(entry) => taken.push(entry),
                        None if finished => break,
                        None => thread::yield_now(),
                    }
                }
                taken
            })
        })
        .collect();

    for handle in producer_handles {
        handle.join().unwrap();
    }
    produced_done.store(true, Ordering::Release);

    let mut seen = HashSet::new();
    for handle in consumer_handles {
        for (extracted_key, payload) in handle.join().unwrap() {
            assert!(seen.insert(extracted_key), "{extracted_key:?} extracted twice");
            let index = (payload / std::mem::align_of::<usize>() - 1) as u32;
            assert_eq!(extracted_key, key::<C>(index));
        }
    }

    assert_eq!(seen.len(), (producers * items_per_producer) as usize);
    assert!(container.is_empty());
    assert_eq!(container.available(), container.capacity());
}

/// Test that extractions racing only with each other come out ascending per
/// thread and never skip or repeat an entry
pub fn test_concurrent_extract_minimum<C>()
where
    C: OrderedContainer<usize> + Default + Send + Sync + 'static,
    C::Key: TestKey,
{
    let container = Arc::new(C::default());
    let total = container.capacity().min(4000) as u32;
    for index in (0..total).rev() {
        container.insert(key::<C>(index), payload_for(index)).unwrap();
    }

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = Arc::clone(&container);
            thread::spawn(move || {
                let mut taken = Vec::new();
                while let Some((extracted_key, _)) = container.extract_minimum() {
                    taken.push(extracted_key);
                }
                taken
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        let taken = handle.join().unwrap();
        assert!(taken.windows(2).all(|pair| pair[0] < pair[1]));
        for extracted_key in taken {
            assert!(seen.insert(extracted_key));
        }
    }
    assert_eq!(seen.len(), total as usize);
    assert_eq!(container.available(), container.capacity());
}

/// Test that extract_minimum never passes over a smaller key whose insert has
/// completed: a producer inserts descending keys and publishes each one once
/// its insert returns, while a single consumer drains concurrently
pub fn test_extract_minimum_respects_completed_inserts<C>()
where
    C: OrderedContainer<usize> + Send + Sync + 'static,
    C::Key: TestKey,
{
    const NOTHING_PUBLISHED: u32 = u32::MAX;
    let keys = 256u32;

    for _ in 0..50 {
        let container = Arc::new(C::with_capacity(keys as usize).unwrap());
        let published = Arc::new(AtomicU32::new(NOTHING_PUBLISHED));

        let producer = {
            let container = Arc::clone(&container);
            let published = Arc::clone(&published);
            thread::spawn(move || {
                for index in (0..keys).rev() {
                    container.insert(key::<C>(index), payload_for(index)).unwrap();
                    published.store(index, Ordering::SeqCst);
                }
            })
        };

        let mut taken = vec![false; keys as usize];
        let mut remaining = keys;
        while remaining > 0 {
            // Every key >= `smallest` is inserted; `smallest` is live unless taken.
            let smallest = published.load(Ordering::SeqCst);
            let pending = smallest != NOTHING_PUBLISHED && !taken[smallest as usize];

            match container.extract_minimum() {
                Some((extracted_key, payload)) => {
                    let index = (payload / std::mem::align_of::<usize>() - 1) as u32;
                    assert_eq!(extracted_key, key::<C>(index));
                    if pending {
                        assert!(
                            index <= smallest,
                            "extracted {index} while {smallest} was live"
                        );
                    }
                    assert!(!taken[index as usize], "{index} extracted twice");
                    taken[index as usize] = true;
                    remaining -= 1;
                }
                None => {
                    assert!(!pending, "nothing extracted while {smallest} was live");
                    thread::yield_now();
                }
            }
        }

        producer.join().unwrap();
        assert!(container.is_empty());
        assert_eq!(container.available(), keys as usize);
    }
}

/// Test that successful inserts minus successful extractions matches the live
/// count at quiescence, with a small pool to force OutOfCapacity
pub fn test_count_invariant<C>()
where
    C: OrderedContainer<usize> + Send + Sync + 'static,
    C::Key: TestKey,
{
    let capacity = 64;
    let container = Arc::new(C::with_capacity(capacity).unwrap());
    let inserted = Arc::new(AtomicUsize::new(0));
    let extracted = Arc::new(AtomicUsize::new(0));
    let stop = Arc::new(AtomicBool::new(false));

    let handles: Vec<_> = (0..8u32)
        .map(|t| {
            let container = Arc::clone(&container);
            let inserted = Arc::clone(&inserted);
            let extracted = Arc::clone(&extracted);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                // Disjoint key spaces, so every successful insert adds an entry.
                let mut next = t;
                while !stop.load(Ordering::Relaxed) {
                    if fastrand::bool() {
                        if container.insert(key::<C>(next), payload_for(next)).is_ok() {
                            inserted.fetch_add(1, Ordering::Relaxed);
                            next += 8;
                        }
                    } else if container.extract_minimum().is_some() {
                        extracted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_secs(2));
    stop.store(true, Ordering::Relaxed);
    for handle in handles {
        handle.join().unwrap();
    }

    let live = inserted.load(Ordering::Relaxed) - extracted.load(Ordering::Relaxed);
    assert_eq!(container.len(), live);
    assert_eq!(container.available(), capacity - live);

    let mut drained = 0;
    while container.extract_minimum().is_some() {
        drained += 1;
    }
    assert_eq!(drained, live);
    assert_eq!(container.available(), capacity);

    println!(
        "inserted: {}, extracted: {}, live at stop: {}",
        inserted.load(Ordering::Relaxed),
        extracted.load(Ordering::Relaxed),
        live
    );
}

/// Test concurrent inserts of the same keys: one live entry per key remains
pub fn test_concurrent_same_key_inserts<C>()
where
    C: OrderedContainer<usize> + Default + Send + Sync + 'static,
    C::Key: TestKey,
{
    let container = Arc::new(C::default());
    let keys = 64u32;
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8u32)
        .map(|t| {
            let container = Arc::clone(&container);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut inserted = 0;
                for index in 0..keys {
                    let result = container.insert(key::<C>(index), payload_for(index * 8 + t));
                    if result.unwrap().is_inserted() {
                        inserted += 1;
                    }
                }
                inserted
            })
        })
        .collect();

    let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(inserted, keys as usize);
    assert_eq!(container.len(), keys as usize);

    for index in 0..keys {
        let (extracted_key, payload) = container.extract_minimum().unwrap();
        assert_eq!(extracted_key, key::<C>(index));
        let tag = (payload / std::mem::align_of::<usize>() - 1) as u32;
        assert_eq!(tag / 8, index);
    }
    assert_eq!(container.extract_minimum(), None);
    assert_eq!(container.available(), container.capacity());
}

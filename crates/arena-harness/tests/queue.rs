//! Bounded queue semantics under real agent concurrency.

use arena::{ArrayRef, ElemKind, Ref};
use arena_harness::{coordinator, AgentGroup};
use arena_sync::BoundedQueue;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[test]
fn put_blocks_on_a_full_queue_until_a_get() {
    let runtime = coordinator(4096).expect("coordinator");
    let queue = BoundedQueue::new(&runtime, 3).unwrap();
    let refs: Vec<Ref> = (0..4)
        .map(|_| runtime.arena().allocate(2).unwrap())
        .collect();

    for r in &refs[..3] {
        queue.put(*r);
    }
    assert_eq!(queue.len(), queue.capacity());

    let landed = Arc::new(AtomicBool::new(false));
    let group = {
        let queue = queue.clone();
        let landed = Arc::clone(&landed);
        let fourth = refs[3];
        AgentGroup::spawn(&runtime, 1, move |_, _| {
            queue.put(fourth);
            landed.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(30));
    assert!(!landed.load(Ordering::SeqCst), "put must block while full");

    assert_eq!(queue.get(), refs[0]);
    group.join();
    assert!(landed.load(Ordering::SeqCst));
    assert_eq!(queue.len(), queue.capacity());
}

#[test]
fn mpmc_stress_keeps_per_producer_order() {
    const PRODUCERS: u32 = 3;
    const CONSUMERS: u32 = 2;
    const PER_PRODUCER: i32 = 200;

    // Every queued item is a 2-element int32 array [producer, seq].
    let runtime = coordinator(1 << 14).expect("coordinator");
    let queue = BoundedQueue::new(&runtime, 4).unwrap();
    let received: Arc<Mutex<Vec<(u32, i32, i32)>>> = Arc::new(Mutex::new(Vec::new()));

    let watched = Arc::new(AtomicBool::new(true));
    let monitor = {
        let queue = queue.clone();
        let watched = Arc::clone(&watched);
        thread::spawn(move || {
            while watched.load(Ordering::SeqCst) {
                assert!(queue.len() <= queue.capacity());
                thread::yield_now();
            }
        })
    };

    let group = {
        let queue = queue.clone();
        let received = Arc::clone(&received);
        AgentGroup::spawn(
            &runtime,
            (PRODUCERS + CONSUMERS) as usize,
            move |rt, id| {
                let mut rng = StdRng::seed_from_u64(0xA11C_0000 ^ id.0 as u64);
                if id.0 <= PRODUCERS {
                    for seq in 0..PER_PRODUCER {
                        let item =
                            ArrayRef::allocate(rt.arena(), ElemKind::Int32, 2).unwrap();
                        item.set_i32(0, id.0 as i32);
                        item.set_i32(1, seq);
                        queue.put(item.base());
                        if rng.gen_bool(0.1) {
                            thread::yield_now();
                        }
                    }
                } else {
                    // Consumers split the total evenly.
                    let share = PRODUCERS as i32 * PER_PRODUCER / CONSUMERS as i32;
                    for _ in 0..share {
                        let item =
                            ArrayRef::from_ref(rt.arena(), ElemKind::Int32, queue.get())
                                .unwrap();
                        received
                            .lock()
                            .unwrap()
                            .push((id.0, item.get_i32(0), item.get_i32(1)));
                        if rng.gen_bool(0.1) {
                            thread::yield_now();
                        }
                    }
                }
            },
        )
    };
    group.join();
    watched.store(false, Ordering::SeqCst);
    monitor.join().unwrap();
    assert!(queue.is_empty());

    let received = received.lock().unwrap();
    assert_eq!(received.len(), (PRODUCERS as i32 * PER_PRODUCER) as usize);

    // Each consumer must see any single producer's items in send order.
    let mut last_seen: HashMap<(u32, i32), i32> = HashMap::new();
    for &(consumer, producer, seq) in received.iter() {
        if let Some(prior) = last_seen.insert((consumer, producer), seq) {
            assert!(prior < seq, "producer {producer} reordered at consumer {consumer}");
        }
    }

    // And nothing was lost or duplicated.
    let mut per_producer: HashMap<i32, Vec<i32>> = HashMap::new();
    for &(_, producer, seq) in received.iter() {
        per_producer.entry(producer).or_default().push(seq);
    }
    assert_eq!(per_producer.len(), PRODUCERS as usize);
    for seqs in per_producer.values_mut() {
        seqs.sort_unstable();
        assert_eq!(*seqs, (0..PER_PRODUCER).collect::<Vec<_>>());
    }
}

#[test]
fn try_put_never_blocks_on_a_full_queue() {
    let runtime = coordinator(2048).expect("coordinator");
    let queue = BoundedQueue::new(&runtime, 2).unwrap();
    let a = runtime.arena().allocate(2).unwrap();
    let b = runtime.arena().allocate(2).unwrap();
    let c = runtime.arena().allocate(2).unwrap();

    assert!(queue.try_put(a));
    assert!(queue.try_put(b));

    let group = {
        let queue = queue.clone();
        AgentGroup::spawn(&runtime, 2, move |_, _| {
            assert!(!queue.try_put(c));
        })
    };
    group.join();

    assert_eq!(queue.len(), 2);
    assert_eq!(queue.get(), a);
}

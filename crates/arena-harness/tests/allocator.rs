//! Cross-agent allocator properties: disjoint ranges and the out-of-memory
//! boundary.

use arena::{ArenaError, Ref};
use arena_harness::{coordinator, AgentGroup};
use std::sync::Arc;
use std::sync::Mutex;

#[test]
fn concurrent_allocations_are_pairwise_disjoint() {
    const AGENTS: usize = 8;
    const WORDS: usize = 6;

    let runtime = coordinator(4096).expect("coordinator");
    let claimed: Arc<Mutex<Vec<Ref>>> = Arc::new(Mutex::new(Vec::new()));

    let group = {
        let claimed = Arc::clone(&claimed);
        AgentGroup::spawn(&runtime, AGENTS, move |rt, _| {
            let base = rt.arena().allocate(WORDS).expect("allocate");
            claimed.lock().unwrap().push(base);
        })
    };
    group.join();

    let mut bases: Vec<u32> = claimed.lock().unwrap().iter().map(|r| r.0).collect();
    bases.sort_unstable();
    assert_eq!(bases.len(), AGENTS);
    for pair in bases.windows(2) {
        // Ranges are [base, base + WORDS); adjacent bases must not overlap.
        assert!(pair[0] + WORDS as u32 <= pair[1]);
    }
    // The bump allocator hands out exactly WORDS words per claim, so the
    // union of the claimed ranges covers AGENTS * WORDS words.
    assert_eq!(
        bases.last().unwrap() - bases.first().unwrap(),
        ((AGENTS - 1) * WORDS) as u32
    );
}

#[test]
fn out_of_memory_exactly_past_the_last_fit() {
    // Header occupies 10 words; room for exactly five 8-word claims in a
    // 50-word arena (rounded up to 50 even words by the arena).
    let runtime = coordinator(50).expect("coordinator");
    let arena = runtime.arena();

    for _ in 0..5 {
        arena.allocate(8).expect("fits");
    }
    assert!(matches!(
        arena.allocate(8),
        Err(ArenaError::OutOfMemory { .. })
    ));
    // Smaller requests that still fit keep succeeding until the limit.
    assert!(matches!(
        arena.allocate(2),
        Err(ArenaError::OutOfMemory { .. })
    ));
}

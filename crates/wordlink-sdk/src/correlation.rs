// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Correlation id allocation with a rolling collision-avoidance window.
//!
//! Ids are soft-unique: no id repeats within the last [`WINDOW_SIZE`]
//! allocations of one allocator. They are not cryptographically unique.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use rand::Rng;
use tracing::{debug, warn};
use wordlink_protocol::{CORRELATION_ID_SPACE, CorrelationId};

/// Number of recent ids an allocation must not collide with.
pub const WINDOW_SIZE: usize = 20;

/// Re-seeded candidates tried before falling back to a random id.
pub const MAX_ATTEMPTS: u64 = 100;

/// Produces the time-derived seed for each candidate.
pub type SeedSource = Arc<dyn Fn() -> u64 + Send + Sync>;

/// FIFO of recent ids with O(1) membership.
#[derive(Debug, Default)]
struct Window {
    order: VecDeque<CorrelationId>,
    members: HashSet<CorrelationId>,
}

impl Window {
    fn contains(&self, id: CorrelationId) -> bool {
        self.members.contains(&id)
    }

    fn push(&mut self, id: CorrelationId) {
        if !self.members.insert(id) {
            // Refresh: move the existing entry to the newest position.
            self.order.retain(|existing| *existing != id);
        }
        self.order.push_back(id);
        while self.order.len() > WINDOW_SIZE {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
    }
}

/// Hands out correlation ids, serializing concurrent callers.
pub struct CorrelationAllocator {
    window: Mutex<Window>,
    seed: SeedSource,
}

impl CorrelationAllocator {
    /// Allocator seeded from the system clock.
    pub fn new() -> Self {
        Self::with_seed_source(Arc::new(clock_seed))
    }

    /// Allocator with an injected seed source.
    pub fn with_seed_source(seed: SeedSource) -> Self {
        Self {
            window: Mutex::new(Window::default()),
            seed,
        }
    }

    /// Allocate an id not present in the current window.
    ///
    /// Never fails. After [`MAX_ATTEMPTS`] colliding candidates a uniformly
    /// random id is returned and recorded even if it collides.
    pub fn allocate(&self) -> CorrelationId {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);

        for attempt in 0..MAX_ATTEMPTS {
            let candidate = CorrelationId::fold(mix((self.seed)(), attempt));
            if !window.contains(candidate) {
                window.push(candidate);
                debug!(correlation_id = %candidate, attempt, "allocated correlation id");
                return candidate;
            }
        }

        let fallback = CorrelationId::fold(u64::from(
            rand::thread_rng().gen_range(0..CORRELATION_ID_SPACE),
        ));
        warn!(
            correlation_id = %fallback,
            attempts = MAX_ATTEMPTS,
            "correlation window exhausted, using random id"
        );
        window.push(fallback);
        fallback
    }

    /// Record an id that was derived rather than allocated, so later
    /// allocations avoid it.
    pub fn record(&self, id: CorrelationId) {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
    }

    /// Whether `id` is inside the current window.
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    /// Current window contents, oldest first.
    pub fn recent(&self) -> Vec<CorrelationId> {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .iter()
            .copied()
            .collect()
    }
}

impl Default for CorrelationAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CorrelationAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationAllocator")
            .field("recent", &self.recent())
            .finish()
    }
}

fn clock_seed() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .map(|n| n as u64)
        .unwrap_or_default()
}

/// splitmix64 over the seed and attempt number.
fn mix(seed: u64, attempt: u64) -> u64 {
    let mut z = seed
        .wrapping_add(attempt.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn constant(seed: u64) -> CorrelationAllocator {
        CorrelationAllocator::with_seed_source(Arc::new(move || seed))
    }

    #[test]
    fn test_sliding_window_has_no_repeats() {
        // A frozen clock forces every allocation through the re-seed path.
        let allocator = constant(1_700_000_000_000);
        let ids: Vec<CorrelationId> = (0..21).map(|_| allocator.allocate()).collect();

        for window in ids.windows(WINDOW_SIZE) {
            let unique: HashSet<_> = window.iter().collect();
            assert_eq!(unique.len(), WINDOW_SIZE);
        }
        assert!(ids.iter().all(|id| id.get() < CORRELATION_ID_SPACE));
    }

    #[test]
    fn test_window_is_bounded() {
        let counter = Arc::new(AtomicU64::new(0));
        let source = counter.clone();
        let allocator = CorrelationAllocator::with_seed_source(Arc::new(move || {
            source.fetch_add(1, Ordering::SeqCst)
        }));

        let first = allocator.allocate();
        for _ in 0..WINDOW_SIZE {
            allocator.allocate();
        }
        assert_eq!(allocator.recent().len(), WINDOW_SIZE);
        assert!(!allocator.contains(first));
    }

    #[test]
    fn test_record_blocks_future_allocation() {
        let allocator = constant(42);
        let predicted = CorrelationId::fold(mix(42, 0));
        allocator.record(predicted);

        let allocated = allocator.allocate();
        assert_ne!(allocated, predicted);
        assert!(allocator.contains(predicted));
        assert!(allocator.contains(allocated));
    }

    #[test]
    fn test_record_refreshes_existing_entry() {
        let allocator = constant(7);
        let id = CorrelationId::fold(5);
        allocator.record(id);
        allocator.record(CorrelationId::fold(6));
        allocator.record(id);

        assert_eq!(
            allocator.recent(),
            vec![CorrelationId::fold(6), CorrelationId::fold(5)]
        );
    }

    #[test]
    fn test_reseed_candidates_are_spread() {
        // With a frozen clock the window can only be exhausted if the
        // re-seeded candidates collapse onto fewer than WINDOW_SIZE values.
        let candidates: HashSet<CorrelationId> = (0..MAX_ATTEMPTS)
            .map(|attempt| CorrelationId::fold(mix(99, attempt)))
            .collect();
        assert!(candidates.len() > WINDOW_SIZE);
    }

    #[test]
    fn test_concurrent_allocations_are_distinct() {
        let allocator = Arc::new(constant(123));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let allocator = allocator.clone();
                std::thread::spawn(move || (0..5).map(|_| allocator.allocate()).collect::<Vec<_>>())
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(all.len(), WINDOW_SIZE);
    }
}

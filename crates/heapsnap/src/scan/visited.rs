//! Resettable concurrent marker set for visited entities.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::graph::EntityId;

/// Shard count must be a power of two so the top hash bits index directly.
const SHARD_COUNT: usize = 64;

/// A concurrent "already observed" set keyed by entity identity.
///
/// The set guards the at-most-once-per-pass visit invariant: [`mark`] is an
/// atomic membership-test-and-insert, so two workers racing on the same
/// entity agree on exactly one winner. [`reset`] clears the set between
/// passes so each pass re-verifies with fresh state.
///
/// Internally the set is sharded: each shard is a mutex-guarded `HashSet`,
/// and `mark` touches exactly one shard.
///
/// [`mark`]: ReusableSet::mark
/// [`reset`]: ReusableSet::reset
#[derive(Debug)]
pub struct ReusableSet {
    shards: Box<[Mutex<HashSet<EntityId>>]>,
}

impl ReusableSet {
    /// Create an empty marker set.
    #[must_use]
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(HashSet::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards }
    }

    fn shard(&self, id: EntityId) -> &Mutex<HashSet<EntityId>> {
        // Fibonacci hashing; sequential ids would otherwise pile into the
        // low shards.
        let hash = id.0.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let index = (hash >> 58) as usize & (SHARD_COUNT - 1);
        &self.shards[index]
    }

    /// Mark an entity as visited.
    ///
    /// Returns `true` if the entity was not marked before, i.e. the caller
    /// won the race and owns this entity's visit for the current pass.
    pub fn mark(&self, id: EntityId) -> bool {
        self.shard(id).lock().insert(id)
    }

    /// Whether the entity has been marked in the current pass.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.shard(id).lock().contains(&id)
    }

    /// Clear all marks, making the set ready for the next pass.
    pub fn reset(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }

    /// Number of marked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Whether no entity is marked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.lock().is_empty())
    }
}

impl Default for ReusableSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::ReusableSet;
    use crate::graph::EntityId;

    #[test]
    fn mark_is_test_and_insert() {
        let set = ReusableSet::new();
        assert!(set.mark(EntityId(1)));
        assert!(!set.mark(EntityId(1)));
        assert!(set.contains(EntityId(1)));
        assert!(!set.contains(EntityId(2)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn reset_clears_every_shard() {
        let set = ReusableSet::new();
        for id in 0..1000 {
            assert!(set.mark(EntityId(id)));
        }
        assert_eq!(set.len(), 1000);
        set.reset();
        assert!(set.is_empty());
        assert!(set.mark(EntityId(0)));
    }

    #[test]
    fn concurrent_marking_has_one_winner_per_entity() {
        let set = ReusableSet::new();
        let wins = AtomicUsize::new(0);
        let ids = 512_u64;

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for id in 0..ids {
                        if set.mark(EntityId(id)) {
                            wins.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(wins.load(Ordering::Relaxed), ids as usize);
        assert_eq!(set.len(), ids as usize);
    }
}

//! The authoritative snapshot of the frozen heap.
//!
//! [`SnapshotStore`] maps entity identity to the state each entity had when
//! it was last scanned successfully. The analysis engine owns all mutation,
//! strictly between passes; the verifier only reads entries and reports
//! divergence. Any mid-pass mutation is a caller contract violation the
//! verifier does not defend against.

use std::collections::HashMap;

use crate::graph::{Constant, EntityId, Slot};

/// Recorded state of one entity: a value per slot plus the generation the
/// entry was last written in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotEntry {
    slots: HashMap<Slot, Constant>,
    generation: u64,
}

impl SnapshotEntry {
    pub(crate) fn new(generation: u64) -> Self {
        Self {
            slots: HashMap::new(),
            generation,
        }
    }

    /// The recorded value of a slot, if one was recorded.
    #[must_use]
    pub fn slot(&self, slot: Slot) -> Option<&Constant> {
        self.slots.get(&slot)
    }

    /// Record a slot value, replacing any previous one.
    pub fn set_slot(&mut self, slot: Slot, value: Constant) {
        self.slots.insert(slot, value);
    }

    /// Number of recorded slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The generation this entry was created in.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// The mapping from entity identity to its recorded snapshot entry.
///
/// Lookup is the only operation the verifier uses. The mutating methods
/// exist for the analysis engine (and test fixtures) and must never be
/// called while a pass is running.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    entries: HashMap<EntityId, SnapshotEntry>,
    generation: u64,
}

impl SnapshotStore {
    /// Create an empty store at generation zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded entry for an entity.
    #[must_use]
    pub fn lookup(&self, entity: EntityId) -> Option<&SnapshotEntry> {
        self.entries.get(&entity)
    }

    /// Whether the entity has been snapshotted at all.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entries.contains_key(&entity)
    }

    /// Number of snapshotted entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ensure an entry exists for the entity and return it for mutation.
    ///
    /// Analysis-engine side only; never called during a pass.
    pub fn insert_entry(&mut self, entity: EntityId) -> &mut SnapshotEntry {
        let generation = self.generation;
        self.entries
            .entry(entity)
            .or_insert_with(|| SnapshotEntry::new(generation))
    }

    /// Record one slot value for an entity, creating the entry on demand.
    ///
    /// Analysis-engine side only; never called during a pass.
    pub fn record_slot(&mut self, entity: EntityId, slot: Slot, value: Constant) {
        self.insert_entry(entity).set_slot(slot, value);
    }

    /// Advance the store to the next analysis generation and return it.
    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::SnapshotStore;
    use crate::graph::{Constant, EntityId, FieldId, Slot};

    const A: EntityId = EntityId(1);
    const F: Slot = Slot::Field(FieldId(0));

    #[test]
    fn record_and_lookup() {
        let mut store = SnapshotStore::new();
        assert!(store.is_empty());
        store.record_slot(A, F, Constant::Int(1));
        let entry = store.lookup(A).unwrap();
        assert_eq!(entry.slot(F), Some(&Constant::Int(1)));
        assert_eq!(entry.slot(Slot::Element(0)), None);
        assert_eq!(store.len(), 1);
        assert!(store.contains(A));
        assert!(!store.contains(EntityId(99)));
    }

    #[test]
    fn entries_keep_their_creation_generation() {
        let mut store = SnapshotStore::new();
        store.insert_entry(A);
        assert_eq!(store.lookup(A).unwrap().generation(), 0);
        assert_eq!(store.bump_generation(), 1);
        store.insert_entry(EntityId(2));
        assert_eq!(store.lookup(EntityId(2)).unwrap().generation(), 1);
        // Existing entries are not rewritten by insert_entry.
        assert_eq!(store.lookup(A).unwrap().generation(), 0);
    }

    #[test]
    fn slot_values_are_replaced_in_place() {
        let mut store = SnapshotStore::new();
        store.record_slot(A, F, Constant::Int(1));
        store.record_slot(A, F, Constant::Int(2));
        assert_eq!(store.lookup(A).unwrap().slot_count(), 1);
        assert_eq!(store.lookup(A).unwrap().slot(F), Some(&Constant::Int(2)));
    }
}

//! Iterative object-graph traversal with a pluggable observer.

use std::collections::VecDeque;
use std::fmt;

use crate::error::ScanError;
use crate::graph::{
    Constant, ConstantProvider, EntityId, EntityShape, FieldId, Slot, TypeId, Universe,
};
use crate::scan::visited::ReusableSet;

/// Why a root (or a transitively discovered entity) is being scanned.
///
/// A closed set: the comparison and reporting logic dispatches on it, and a
/// root discovered via a dedicated path (type metadata) must stay
/// distinguishable from ordinary field reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanReason {
    /// An ordinary reachable root submitted by the driver.
    Root,
    /// The synthetic metadata root of a reachable type.
    TypeMetadata(TypeId),
    /// Discovered through a field of an already scanned entity.
    Field {
        /// The entity whose field referenced this one.
        parent: EntityId,
        /// The referencing field.
        field: FieldId,
    },
    /// Discovered through an array element of an already scanned entity.
    Element {
        /// The array whose element referenced this one.
        parent: EntityId,
        /// The referencing index.
        index: usize,
    },
}

impl fmt::Display for ScanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::TypeMetadata(ty) => write!(f, "metadata of {ty}"),
            Self::Field { parent, field } => write!(f, "{field} of {parent}"),
            Self::Element { parent, index } => write!(f, "element {index} of {parent}"),
        }
    }
}

/// One unit of scan work: a root constant under a reason. Transient; created
/// and discarded within one pass.
#[derive(Debug, Clone)]
pub struct ScanTask {
    /// The constant to scan from.
    pub root: Constant,
    /// Why this root is being scanned.
    pub reason: ScanReason,
}

/// Callbacks invoked by the scanner for every traversal event.
///
/// The same scanner runs under two observers: the analysis engine installs
/// one that populates the snapshot store during normal scanning, and the
/// verifier installs one that compares fresh reads against the store.
/// Sharing the traversal keeps construction and verification semantics
/// identical.
pub trait ScanObserver: Sync {
    /// An entity is visited for the first time in this pass.
    fn entity_visited(&self, entity: EntityId, reason: ScanReason);

    /// A slot of a visited entity was read, producing `value`.
    fn slot_read(&self, entity: EntityId, slot: Slot, value: &Constant);

    /// An entity was discovered through a slot, not as a submitted root.
    fn new_reachable(&self, entity: EntityId);
}

/// The traversal engine.
///
/// Given a root constant, visits its fields and array elements transitively,
/// consulting the shared marker set so each entity is dispatched at most once
/// per pass regardless of how many paths reach it. Traversal is iterative
/// over an explicit worklist, so deep or cyclic graphs never exhaust the call
/// stack.
pub struct ObjectScanner<'a> {
    universe: &'a dyn Universe,
    provider: &'a dyn ConstantProvider,
    visited: &'a ReusableSet,
    observer: &'a dyn ScanObserver,
}

impl<'a> ObjectScanner<'a> {
    /// Assemble a scanner over the given capabilities.
    #[must_use]
    pub const fn new(
        universe: &'a dyn Universe,
        provider: &'a dyn ConstantProvider,
        visited: &'a ReusableSet,
        observer: &'a dyn ScanObserver,
    ) -> Self {
        Self {
            universe,
            provider,
            visited,
            observer,
        }
    }

    /// Scan the object graph rooted at `root`.
    ///
    /// Scalar roots have no interior and return immediately. A root already
    /// claimed by another task in this pass is skipped.
    ///
    /// # Errors
    ///
    /// [`ScanError::HostRead`] when a field/element read fails, tagged with
    /// the offending entity and slot; this aborts the current task only.
    /// [`ScanError::UnsupportedValue`] when an entity's shape is unknown,
    /// which aborts the whole pass.
    pub fn scan(&self, root: &Constant, reason: ScanReason) -> Result<(), ScanError> {
        let Some(root_id) = root.as_object() else {
            return Ok(());
        };
        let mut worklist = VecDeque::new();
        if self.visited.mark(root_id) {
            worklist.push_back((root_id, reason));
        }

        while let Some((entity, reason)) = worklist.pop_front() {
            self.observer.entity_visited(entity, reason);
            let shape = self
                .universe
                .shape_of(entity)
                .ok_or(ScanError::UnsupportedValue { entity })?;
            match shape {
                EntityShape::Opaque => {}
                EntityShape::Instance { fields } => {
                    for field in fields {
                        let value = self.provider.read_field(entity, field, true)?;
                        self.follow(entity, Slot::Field(field), value, &mut worklist);
                    }
                }
                EntityShape::Array { length } => {
                    for index in 0..length {
                        let value = self.provider.read_element(entity, index)?;
                        self.follow(entity, Slot::Element(index), value, &mut worklist);
                    }
                }
            }
        }
        Ok(())
    }

    /// Report one slot read and enqueue the referenced entity if this task
    /// is the first to see it.
    fn follow(
        &self,
        entity: EntityId,
        slot: Slot,
        value: Constant,
        worklist: &mut VecDeque<(EntityId, ScanReason)>,
    ) {
        self.observer.slot_read(entity, slot, &value);
        let Some(child) = value.as_object() else {
            return;
        };
        if self.visited.mark(child) {
            self.observer.new_reachable(child);
            let reason = match slot {
                Slot::Field(field) => ScanReason::Field {
                    parent: entity,
                    field,
                },
                Slot::Element(index) => ScanReason::Element {
                    parent: entity,
                    index,
                },
            };
            worklist.push_back((child, reason));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::{ObjectScanner, ScanObserver, ScanReason};
    use crate::graph::{Constant, EntityId, FieldId, Slot};
    use crate::scan::visited::ReusableSet;
    use crate::test_util::GraphFixture;

    const NEXT: FieldId = FieldId(0);
    const VALUE: FieldId = FieldId(1);

    #[derive(Default)]
    struct Recorder {
        visits: Mutex<Vec<(EntityId, ScanReason)>>,
        reads: Mutex<HashMap<(EntityId, Slot), usize>>,
        discovered: Mutex<Vec<EntityId>>,
    }

    impl ScanObserver for Recorder {
        fn entity_visited(&self, entity: EntityId, reason: ScanReason) {
            self.visits.lock().unwrap().push((entity, reason));
        }

        fn slot_read(&self, entity: EntityId, slot: Slot, _value: &Constant) {
            *self.reads.lock().unwrap().entry((entity, slot)).or_insert(0) += 1;
        }

        fn new_reachable(&self, entity: EntityId) {
            self.discovered.lock().unwrap().push(entity);
        }
    }

    #[test]
    fn cyclic_graph_terminates() {
        let fx = GraphFixture::new();
        let a = fx.add_instance(&[(NEXT, Constant::Null)]);
        let b = fx.add_instance(&[(NEXT, Constant::Object(a))]);
        fx.set_field(a, NEXT, Constant::Object(b));

        let visited = ReusableSet::new();
        let recorder = Recorder::default();
        let scanner = ObjectScanner::new(&fx, &fx, &visited, &recorder);
        scanner.scan(&Constant::Object(a), ScanReason::Root).unwrap();

        let visits = recorder.visits.lock().unwrap();
        assert_eq!(visits.len(), 2);
        assert_eq!(visits[0], (a, ScanReason::Root));
        assert_eq!(visits[1], (b, ScanReason::Field { parent: a, field: NEXT }));
        assert_eq!(*recorder.discovered.lock().unwrap(), vec![b]);
    }

    #[test]
    fn arrays_are_read_element_by_element() {
        let fx = GraphFixture::new();
        let leaf = fx.add_opaque();
        fx.unlist(leaf);
        let arr = fx.add_array(&[Constant::Int(1), Constant::Object(leaf), Constant::Null]);

        let visited = ReusableSet::new();
        let recorder = Recorder::default();
        let scanner = ObjectScanner::new(&fx, &fx, &visited, &recorder);
        scanner
            .scan(&Constant::Object(arr), ScanReason::Root)
            .unwrap();

        let reads = recorder.reads.lock().unwrap();
        assert_eq!(reads.len(), 3);
        assert_eq!(reads[&(arr, Slot::Element(1))], 1);
        assert_eq!(*recorder.discovered.lock().unwrap(), vec![leaf]);
    }

    #[test]
    fn scalar_roots_are_leaves() {
        let fx = GraphFixture::new();
        let visited = ReusableSet::new();
        let recorder = Recorder::default();
        let scanner = ObjectScanner::new(&fx, &fx, &visited, &recorder);
        scanner.scan(&Constant::Int(7), ScanReason::Root).unwrap();
        scanner
            .scan(&Constant::str("leaf"), ScanReason::Root)
            .unwrap();
        assert!(recorder.visits.lock().unwrap().is_empty());
    }

    #[test]
    fn fields_are_read_once_per_pass() {
        let fx = GraphFixture::new();
        let shared = fx.add_instance(&[(VALUE, Constant::Int(3))]);
        fx.unlist(shared);
        let left = fx.add_instance(&[(NEXT, Constant::Object(shared))]);
        let right = fx.add_instance(&[(NEXT, Constant::Object(shared))]);

        let visited = ReusableSet::new();
        let recorder = Recorder::default();
        let scanner = ObjectScanner::new(&fx, &fx, &visited, &recorder);
        scanner
            .scan(&Constant::Object(left), ScanReason::Root)
            .unwrap();
        scanner
            .scan(&Constant::Object(right), ScanReason::Root)
            .unwrap();

        let reads = recorder.reads.lock().unwrap();
        assert_eq!(reads[&(shared, Slot::Field(VALUE))], 1);
    }
}

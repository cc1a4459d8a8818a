//! In-memory graph fixture for exercising the scanner and the verifier.
//!
//! [`GraphFixture`] implements [`Universe`] and [`ConstantProvider`] over a
//! mutable entity table, so tests can snapshot a graph, mutate it, and watch
//! the verifier flag the drift. [`SnapshotRecorder`] is the
//! construction-side observer: it populates a [`SnapshotStore`] through the
//! same [`ObjectScanner`] the verifier uses.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::HostReadError;
use crate::graph::{
    Constant, ConstantProvider, EntityId, EntityShape, FieldId, InvalidationProbe, Slot, TypeId,
    Universe,
};
use crate::scan::{ObjectScanner, ReusableSet, ScanObserver, ScanReason};
use crate::snapshot::SnapshotStore;

enum FieldState {
    Value(Constant),
    Fails(String),
}

enum RecordKind {
    Instance { fields: Vec<(FieldId, FieldState)> },
    Array { elements: Vec<Constant> },
    Opaque,
    Undecomposable,
}

struct EntityRecord {
    kind: RecordKind,
    /// Whether `reachable_entities` lists this entity.
    listed: bool,
    /// Whether `is_reachable` reports it as promoted.
    reachable: bool,
}

#[derive(Default)]
struct FixtureState {
    entities: BTreeMap<EntityId, EntityRecord>,
    types: Vec<(TypeId, EntityId)>,
    next_entity: u64,
    next_type: u32,
}

/// A mutable in-memory object graph playing both the universe and the
/// constant provider.
///
/// Newly added entities are listed and reachable by default; [`unlist`] and
/// [`mark_unreachable`] carve out the child-only and candidate-only cases.
/// All mutators take `&self` so a test can hold the fixture borrowed by a
/// verifier and still mutate field values between passes.
///
/// [`unlist`]: GraphFixture::unlist
/// [`mark_unreachable`]: GraphFixture::mark_unreachable
#[derive(Default)]
pub struct GraphFixture {
    state: RwLock<FixtureState>,
}

impl GraphFixture {
    /// Create an empty fixture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add_entity(&self, kind: RecordKind) -> EntityId {
        let mut state = self.state.write();
        let id = EntityId(state.next_entity);
        state.next_entity += 1;
        state.entities.insert(
            id,
            EntityRecord {
                kind,
                listed: true,
                reachable: true,
            },
        );
        id
    }

    /// Add an instance entity with the given fields.
    pub fn add_instance(&self, fields: &[(FieldId, Constant)]) -> EntityId {
        self.add_entity(RecordKind::Instance {
            fields: fields
                .iter()
                .map(|(field, value)| (*field, FieldState::Value(value.clone())))
                .collect(),
        })
    }

    /// Add an array entity with the given elements.
    pub fn add_array(&self, elements: &[Constant]) -> EntityId {
        self.add_entity(RecordKind::Array {
            elements: elements.to_vec(),
        })
    }

    /// Add a leaf entity with no scannable interior.
    pub fn add_opaque(&self) -> EntityId {
        self.add_entity(RecordKind::Opaque)
    }

    /// Add an entity whose shape the scanner cannot resolve, for exercising
    /// the fatal abort path.
    pub fn add_undecomposable(&self) -> EntityId {
        self.add_entity(RecordKind::Undecomposable)
    }

    /// Register a reachable type whose metadata object carries the given
    /// fields. The metadata entity is deliberately not listed as an ordinary
    /// root; it is only reachable through the type-metadata hook.
    pub fn add_type(&self, metadata_fields: &[(FieldId, Constant)]) -> TypeId {
        let meta = self.add_instance(metadata_fields);
        self.unlist(meta);
        let mut state = self.state.write();
        let ty = TypeId(state.next_type);
        state.next_type += 1;
        state.types.push((ty, meta));
        ty
    }

    /// The metadata entity backing a registered type.
    ///
    /// # Panics
    ///
    /// Panics if the type was not registered on this fixture.
    #[must_use]
    pub fn metadata_entity(&self, ty: TypeId) -> EntityId {
        self.state
            .read()
            .types
            .iter()
            .find(|(t, _)| *t == ty)
            .map(|(_, meta)| *meta)
            .expect("unknown type in fixture")
    }

    fn with_record(&self, entity: EntityId, apply: impl FnOnce(&mut EntityRecord)) {
        let mut state = self.state.write();
        let record = state.entities.get_mut(&entity).expect("unknown entity");
        apply(record);
    }

    /// Remove an entity from the `reachable_entities` listing. The entity
    /// stays scannable when discovered through a slot.
    pub fn unlist(&self, entity: EntityId) {
        self.with_record(entity, |record| record.listed = false);
    }

    /// Demote an entity to a not-yet-promoted candidate: still listed, but
    /// `is_reachable` reports false, so the driver filters it out.
    pub fn mark_unreachable(&self, entity: EntityId) {
        self.with_record(entity, |record| record.reachable = false);
    }

    /// Overwrite a field's live value.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not an instance or lacks the field.
    pub fn set_field(&self, entity: EntityId, field: FieldId, value: Constant) {
        self.with_record(entity, |record| {
            let RecordKind::Instance { fields } = &mut record.kind else {
                panic!("{entity} is not an instance");
            };
            let slot = fields
                .iter_mut()
                .find(|(f, _)| *f == field)
                .unwrap_or_else(|| panic!("{entity} has no {field}"));
            slot.1 = FieldState::Value(value);
        });
    }

    /// Overwrite an array element's live value.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not an array or the index is out of bounds.
    pub fn set_element(&self, entity: EntityId, index: usize, value: Constant) {
        self.with_record(entity, |record| {
            let RecordKind::Array { elements } = &mut record.kind else {
                panic!("{entity} is not an array");
            };
            elements[index] = value;
        });
    }

    /// Make future reads of a field fail with a host-read error.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not an instance or lacks the field.
    pub fn fail_field(&self, entity: EntityId, field: FieldId, message: &str) {
        self.with_record(entity, |record| {
            let RecordKind::Instance { fields } = &mut record.kind else {
                panic!("{entity} is not an instance");
            };
            let slot = fields
                .iter_mut()
                .find(|(f, _)| *f == field)
                .unwrap_or_else(|| panic!("{entity} has no {field}"));
            slot.1 = FieldState::Fails(message.to_owned());
        });
    }

    /// Build a snapshot of the current graph state, traversing exactly the
    /// roots a verification pass would: reachable entities plus every
    /// registered type's metadata object.
    ///
    /// # Panics
    ///
    /// Panics if any scan fails; fixtures snapshot well-formed graphs.
    #[must_use]
    pub fn snapshot(&self) -> SnapshotStore {
        let visited = ReusableSet::new();
        let recorder = SnapshotRecorder::new();
        let scanner = ObjectScanner::new(self, self, &visited, &recorder);
        for entity in self.reachable_entities() {
            if self.is_reachable(entity) {
                scanner
                    .scan(&Constant::Object(entity), ScanReason::Root)
                    .expect("fixture root scan failed");
            }
        }
        for ty in self.reachable_types() {
            scanner
                .scan(&self.type_metadata(ty), ScanReason::TypeMetadata(ty))
                .expect("fixture metadata scan failed");
        }
        recorder.into_store()
    }
}

impl Universe for GraphFixture {
    fn reachable_entities(&self) -> Vec<EntityId> {
        self.state
            .read()
            .entities
            .iter()
            .filter(|(_, record)| record.listed)
            .map(|(id, _)| *id)
            .collect()
    }

    fn is_reachable(&self, entity: EntityId) -> bool {
        self.state
            .read()
            .entities
            .get(&entity)
            .is_some_and(|record| record.reachable)
    }

    fn reachable_types(&self) -> Vec<TypeId> {
        self.state.read().types.iter().map(|(ty, _)| *ty).collect()
    }

    fn shape_of(&self, entity: EntityId) -> Option<EntityShape> {
        let state = self.state.read();
        match &state.entities.get(&entity)?.kind {
            RecordKind::Instance { fields } => Some(EntityShape::Instance {
                fields: fields.iter().map(|(field, _)| *field).collect(),
            }),
            RecordKind::Array { elements } => Some(EntityShape::Array {
                length: elements.len(),
            }),
            RecordKind::Opaque => Some(EntityShape::Opaque),
            RecordKind::Undecomposable => None,
        }
    }

    fn type_metadata(&self, ty: TypeId) -> Constant {
        Constant::Object(self.metadata_entity(ty))
    }
}

impl ConstantProvider for GraphFixture {
    fn read_field(
        &self,
        receiver: EntityId,
        field: FieldId,
        _resolve_lazily: bool,
    ) -> Result<Constant, HostReadError> {
        let state = self.state.read();
        let record = state.entities.get(&receiver).ok_or_else(|| {
            HostReadError::new(receiver, Slot::Field(field), "no such entity")
        })?;
        let RecordKind::Instance { fields } = &record.kind else {
            return Err(HostReadError::new(
                receiver,
                Slot::Field(field),
                "receiver has no fields",
            ));
        };
        match fields.iter().find(|(f, _)| *f == field) {
            Some((_, FieldState::Value(value))) => Ok(value.clone()),
            Some((_, FieldState::Fails(message))) => Err(HostReadError::new(
                receiver,
                Slot::Field(field),
                message.clone(),
            )),
            None => Err(HostReadError::new(
                receiver,
                Slot::Field(field),
                "no such field",
            )),
        }
    }

    fn read_element(&self, receiver: EntityId, index: usize) -> Result<Constant, HostReadError> {
        let state = self.state.read();
        let record = state.entities.get(&receiver).ok_or_else(|| {
            HostReadError::new(receiver, Slot::Element(index), "no such entity")
        })?;
        let RecordKind::Array { elements } = &record.kind else {
            return Err(HostReadError::new(
                receiver,
                Slot::Element(index),
                "receiver is not an array",
            ));
        };
        elements.get(index).cloned().ok_or_else(|| {
            HostReadError::new(receiver, Slot::Element(index), "index out of bounds")
        })
    }
}

/// The construction-side observer: records everything a scan sees into a
/// fresh [`SnapshotStore`].
///
/// This is the same traversal the verifier runs, under a different observer;
/// keeping both on one scanner keeps snapshot construction and verification
/// semantics identical.
#[derive(Default)]
pub struct SnapshotRecorder {
    store: Mutex<SnapshotStore>,
}

impl SnapshotRecorder {
    /// Create a recorder over an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the recorder, yielding the populated store.
    #[must_use]
    pub fn into_store(self) -> SnapshotStore {
        self.store.into_inner()
    }
}

impl ScanObserver for SnapshotRecorder {
    fn entity_visited(&self, entity: EntityId, _reason: ScanReason) {
        // Entry creation is unconditional so slotless leaves still count as
        // snapshotted.
        self.store.lock().insert_entry(entity);
    }

    fn slot_read(&self, entity: EntityId, slot: Slot, value: &Constant) {
        self.store.lock().record_slot(entity, slot, value.clone());
    }

    fn new_reachable(&self, entity: EntityId) {
        self.store.lock().insert_entry(entity);
    }
}

/// A settable invalidation probe.
#[derive(Debug, Default)]
pub struct FlagProbe {
    pending: AtomicBool,
}

impl FlagProbe {
    /// Create a probe with no pending invalidation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the pending invalidation.
    pub fn set(&self, pending: bool) {
        self.pending.store(pending, Ordering::Release);
    }
}

impl InvalidationProbe for FlagProbe {
    fn pending_invalidation(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

//! Object-graph data model and the capabilities consumed from the analysis
//! engine.
//!
//! The verifier never owns the object graph. Everything it knows about
//! entities, types, and field values arrives through the three traits defined
//! here, which the points-to analysis engine implements on its side:
//!
//! - [`Universe`] — reachability and shape queries,
//! - [`ConstantProvider`] — live field/element reads (with lazy
//!   materialization applied on the host side),
//! - [`InvalidationProbe`] — polled once per pass to catch non-heap side
//!   effects such as a stale derived cache.

use std::fmt;
use std::sync::Arc;

use crate::error::HostReadError;

/// Identity of an object-graph node.
///
/// Entities are compared by identity, never by content. Two distinct heap
/// objects with equal field values are distinct entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Identity of a reachable type.
///
/// Every reachable type has a host-visible metadata entity, obtained through
/// [`Universe::type_metadata`], that is scanned as a synthetic root even when
/// the type has no instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// Identity of a declared field within the analysis universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field#{}", self.0)
    }
}

/// One addressable slot of an entity: a declared field or an array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    /// A declared instance field.
    Field(FieldId),
    /// An array element at the given index.
    Element(usize),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(field) => write!(f, "{field}"),
            Self::Element(index) => write!(f, "[{index}]"),
        }
    }
}

/// The analysis-side constant representation of a value.
///
/// Scalars compare by value (`Str` by content, `Float` by bit pattern, so
/// `NaN` snapshots are stable); `Object` compares by entity identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    /// The null reference.
    Null,
    /// A boolean scalar.
    Bool(bool),
    /// An integral scalar.
    Int(i64),
    /// A floating-point scalar, stored as its IEEE-754 bit pattern.
    Float(u64),
    /// An immutable string scalar.
    Str(Arc<str>),
    /// A reference to another entity.
    Object(EntityId),
}

impl Constant {
    /// Build a float constant from an `f64` value.
    #[must_use]
    pub fn float(value: f64) -> Self {
        Self::Float(value.to_bits())
    }

    /// Build a string constant.
    #[must_use]
    pub fn str(value: &str) -> Self {
        Self::Str(Arc::from(value))
    }

    /// The referenced entity, if this constant is an object reference.
    #[must_use]
    pub const fn as_object(&self) -> Option<EntityId> {
        match self {
            Self::Object(id) => Some(*id),
            _ => None,
        }
    }
}

/// What the scanner needs to know to decompose one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityShape {
    /// An ordinary instance with declared fields.
    Instance {
        /// The declared fields, in declaration order.
        fields: Vec<FieldId>,
    },
    /// An indexed container.
    Array {
        /// Number of elements.
        length: usize,
    },
    /// A leaf value with no scannable interior (boxed scalar, interned
    /// string payload).
    Opaque,
}

/// Read-only view of the analysis engine's current universe.
///
/// Implementations must be consistent for the duration of one verification
/// pass: the verifier takes the reachable set once at pass start and assumes
/// shapes do not change mid-pass.
pub trait Universe: Sync {
    /// Entities the analysis currently considers reachability candidates.
    ///
    /// May over-approximate; the driver filters through
    /// [`Universe::is_reachable`] before submitting scan tasks.
    fn reachable_entities(&self) -> Vec<EntityId>;

    /// Whether the entity is reachable right now (not merely a candidate).
    fn is_reachable(&self, entity: EntityId) -> bool;

    /// Types the analysis currently considers reachable.
    fn reachable_types(&self) -> Vec<TypeId>;

    /// The shape of an entity, or `None` when the scanner has no way to
    /// decompose it. An unknown shape aborts the whole pass.
    fn shape_of(&self, entity: EntityId) -> Option<EntityShape>;

    /// The host-visible metadata object of a reachable type, synthesized as
    /// a constant so it can be scanned as an extra root.
    fn type_metadata(&self, ty: TypeId) -> Constant;
}

/// Live field/element reads against the host object graph.
///
/// Reads may trigger lazy materialization on the host side and may fail;
/// failures abort the scan task that issued the read, tagged with the
/// offending entity and slot.
pub trait ConstantProvider: Sync {
    /// Read the current value of `field` on `receiver`.
    ///
    /// # Errors
    ///
    /// Returns [`HostReadError`] when the host-side read fails, e.g. when a
    /// lazily computed value cannot currently be produced.
    fn read_field(
        &self,
        receiver: EntityId,
        field: FieldId,
        resolve_lazily: bool,
    ) -> Result<Constant, HostReadError>;

    /// Read the current value of the element at `index` on `receiver`.
    ///
    /// # Errors
    ///
    /// Returns [`HostReadError`] when the host-side read fails.
    fn read_element(&self, receiver: EntityId, index: usize) -> Result<Constant, HostReadError>;
}

/// A polled status provider for process-wide side effects.
///
/// The driver polls every installed probe exactly once per pass, after the
/// scan drains, and ORs the answers into the convergence signal. Probes are
/// injected capabilities, never hidden global state, so the convergence
/// decision stays a pure function of what was observed within the pass.
pub trait InvalidationProbe: Sync {
    /// Whether a process-wide derived structure registered a pending update
    /// during the pass.
    fn pending_invalidation(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::{Constant, EntityId, FieldId, Slot, TypeId};

    #[test]
    fn scalar_constants_compare_by_value() {
        assert_eq!(Constant::Int(7), Constant::Int(7));
        assert_ne!(Constant::Int(7), Constant::Int(8));
        assert_eq!(Constant::str("hub"), Constant::str("hub"));
        assert_eq!(Constant::float(1.5), Constant::float(1.5));
        // NaN has a stable bit pattern under this encoding.
        assert_eq!(Constant::float(f64::NAN), Constant::float(f64::NAN));
        assert_ne!(Constant::Null, Constant::Bool(false));
    }

    #[test]
    fn object_constants_compare_by_identity() {
        assert_eq!(
            Constant::Object(EntityId(3)),
            Constant::Object(EntityId(3))
        );
        assert_ne!(
            Constant::Object(EntityId(3)),
            Constant::Object(EntityId(4))
        );
    }

    #[test]
    fn display_formats() {
        assert_eq!(EntityId(12).to_string(), "entity#12");
        assert_eq!(TypeId(4).to_string(), "type#4");
        assert_eq!(Slot::Field(FieldId(2)).to_string(), "field#2");
        assert_eq!(Slot::Element(9).to_string(), "[9]");
    }
}

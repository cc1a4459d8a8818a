//! What a verification pass found.

use crate::graph::{Constant, EntityId, Slot};

/// A mismatch between a recorded snapshot value and a freshly observed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    /// The entity whose slot diverged.
    pub entity: EntityId,
    /// The diverging slot.
    pub slot: Slot,
    /// The value the snapshot recorded, or `None` when the entry exists but
    /// never recorded this slot.
    pub recorded: Option<Constant>,
    /// The value the fresh scan observed.
    pub observed: Constant,
}

/// Aggregated findings of one verification pass.
///
/// The convergence signal is a monotone OR across everything observed within
/// the pass: any divergence, any entity missing from the snapshot, or any
/// pending external invalidation forces another analysis round.
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    divergences: Vec<Divergence>,
    new_entities: Vec<EntityId>,
    external_invalidation: bool,
}

impl VerificationReport {
    pub(crate) fn new(
        divergences: Vec<Divergence>,
        new_entities: Vec<EntityId>,
        external_invalidation: bool,
    ) -> Self {
        Self {
            divergences,
            new_entities,
            external_invalidation,
        }
    }

    /// Slot values that no longer match the snapshot, ordered by
    /// (entity, slot).
    #[must_use]
    pub fn divergences(&self) -> &[Divergence] {
        &self.divergences
    }

    /// Reachable entities with no snapshot entry at all, in identity order.
    /// The analysis must not converge while any exist.
    #[must_use]
    pub fn new_entities(&self) -> &[EntityId] {
        &self.new_entities
    }

    /// Whether a polled invalidation probe reported a pending update.
    #[must_use]
    pub const fn external_invalidation(&self) -> bool {
        self.external_invalidation
    }

    /// Whether the analysis must run another round before the snapshot can
    /// be considered stable.
    #[must_use]
    pub fn requires_another_round(&self) -> bool {
        !self.divergences.is_empty() || !self.new_entities.is_empty() || self.external_invalidation
    }
}

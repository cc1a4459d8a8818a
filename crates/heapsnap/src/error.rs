//! Failure kinds of the verification subsystem.
//!
//! Two classes exist. Recoverable failures ([`ScanError::HostRead`]) abort
//! only the scan task that hit them; the pass drains and the collected
//! failures are re-raised in aggregate as [`PassError::TaskFailures`]. Fatal
//! failures (an undecomposable value, a concurrency contract violation)
//! cancel the pass and surface as [`PassError::Fatal`] for the build
//! orchestrator to abort on. Nothing is swallowed.

use thiserror::Error;

use crate::graph::{EntityId, Slot};
use crate::scan::ScanReason;

/// A live field/element read failed against the host object graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host read of {slot} on {entity} failed: {message}")]
pub struct HostReadError {
    /// The receiver the read was issued against.
    pub entity: EntityId,
    /// The slot that was being read.
    pub slot: Slot,
    /// Host-side failure description.
    pub message: String,
}

impl HostReadError {
    /// Tag a host-side failure with the offending entity and slot.
    #[must_use]
    pub fn new(entity: EntityId, slot: Slot, message: impl Into<String>) -> Self {
        Self {
            entity,
            slot,
            message: message.into(),
        }
    }
}

/// A failure raised while scanning one root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// A field or element read failed. Aborts the current task only.
    #[error(transparent)]
    HostRead(#[from] HostReadError),

    /// The scanner has no way to decompose the entity. Well-formed graphs
    /// never produce this; it aborts the whole pass.
    #[error("cannot decompose {entity}: shape unknown to the scanner")]
    UnsupportedValue {
        /// The entity with the unknown shape.
        entity: EntityId,
    },

    /// The marker set or snapshot store observed an operation inconsistent
    /// with the single-writer-between-passes contract. Indicates an engine
    /// bug; aborts the whole pass.
    #[error("concurrency contract violated: {0}")]
    Concurrency(String),
}

impl ScanError {
    /// Whether this error cancels the whole pass instead of one task.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::HostRead(_))
    }
}

/// One scan task that failed recoverably, kept with the reason its root was
/// submitted under.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("scan task ({reason}) failed: {error}")]
pub struct TaskFailure {
    /// Why the failed task's root was scanned.
    pub reason: ScanReason,
    /// The failure itself.
    pub error: ScanError,
}

/// Outcome of a verification pass that did not complete cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PassError {
    /// A fatal error cancelled the pass. Already-running tasks were allowed
    /// to finish, but no further tasks were scheduled.
    #[error("verification pass aborted: {0}")]
    Fatal(ScanError),

    /// Recoverable task failures, collected while the rest of the pass
    /// drained and re-raised in aggregate.
    #[error("{} scan task(s) failed", .0.len())]
    TaskFailures(Vec<TaskFailure>),
}

//! Closed-world heap snapshot verification for ahead-of-time compilation.
//!
//! A whole-program compiler freezes every object transitively reachable from
//! program roots into an image the generated program starts from. Building
//! that snapshot is iterative, and side effects triggered *during* scanning
//! (lazily populated caches, on-demand metadata registration) can silently
//! desynchronize the frozen snapshot from the live object graph. `heapsnap`
//! is the verification and convergence subsystem: after an analysis round it
//! concurrently re-scans everything the analysis considers reachable,
//! compares fresh reads against the recorded snapshot, and decides whether
//! the round must repeat or the snapshot is stable.
//!
//! # Architecture
//!
//! - [`HeapVerifier`] — the convergence driver; one [`run_pass`] per analysis
//!   round.
//! - [`ObjectScanner`] — the shared traversal engine, iterative over an
//!   explicit worklist, observed through [`ScanObserver`].
//! - [`ReusableSet`] — the concurrent visited-marker set enforcing
//!   at-most-once visits per pass.
//! - [`TaskRunner`] — the bounded worker pool draining per-root scan tasks.
//! - [`SnapshotStore`] — the recorded snapshot; read-only during a pass.
//!
//! The analysis engine stays on the other side of three injected
//! capabilities: [`Universe`] (reachability and shapes), [`ConstantProvider`]
//! (live field reads), and [`InvalidationProbe`] (process-wide side effects
//! polled once per pass).
//!
//! # Quick Start
//!
//! ```ignore
//! use heapsnap::HeapVerifier;
//!
//! let mut verifier = HeapVerifier::new(&universe, &provider, &store);
//! verifier.add_probe(&derived_map_probe);
//!
//! let mut round = 0;
//! loop {
//!     round += 1;
//!     let outcome = verifier.run_pass(&format!("round {round}"), true)?;
//!     if !outcome.requires_another_round() {
//!         break; // snapshot is stable, code generation may proceed
//!     }
//!     // ... run another analysis round, update the store ...
//! }
//! ```
//!
//! [`run_pass`]: HeapVerifier::run_pass

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod graph;
mod report;
mod snapshot;
mod verifier;

/// Parallel object-graph scanning engine.
pub mod scan;

/// Structured tracing support (feature `tracing`).
pub mod tracing;

pub use error::{HostReadError, PassError, ScanError, TaskFailure};
pub use graph::{
    Constant, ConstantProvider, EntityId, EntityShape, FieldId, InvalidationProbe, Slot, TypeId,
    Universe,
};
pub use report::{Divergence, VerificationReport};
pub use scan::{ObjectScanner, ReusableSet, ScanObserver, ScanReason, ScanTask, TaskRunner};
pub use snapshot::{SnapshotEntry, SnapshotStore};
pub use verifier::{HeapVerifier, PassOutcome};

#[cfg(any(test, feature = "test-util"))]
#[doc(hidden)]
pub mod test_util;

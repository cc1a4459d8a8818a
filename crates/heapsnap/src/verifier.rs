//! The convergence driver: re-scans the reachable heap and decides whether
//! the analysis needs another round.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{PassError, ScanError};
use crate::graph::{Constant, ConstantProvider, EntityId, InvalidationProbe, Slot, Universe};
use crate::report::{Divergence, VerificationReport};
use crate::scan::{ObjectScanner, ReusableSet, ScanObserver, ScanReason, ScanTask, TaskRunner};
use crate::snapshot::SnapshotStore;

/// Result of one completed verification pass.
#[derive(Debug, Clone)]
pub struct PassOutcome {
    phase: String,
    during_analysis: bool,
    report: VerificationReport,
}

impl PassOutcome {
    /// The phase label the pass ran under.
    #[must_use]
    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// Whether the pass ran as part of the fixed-point iteration (as opposed
    /// to the final post-analysis verification).
    #[must_use]
    pub const fn during_analysis(&self) -> bool {
        self.during_analysis
    }

    /// Everything the pass found.
    #[must_use]
    pub const fn report(&self) -> &VerificationReport {
        &self.report
    }

    /// Whether the analysis must run another round.
    #[must_use]
    pub fn requires_another_round(&self) -> bool {
        self.report.requires_another_round()
    }

    /// Consume the outcome, keeping only the report.
    #[must_use]
    pub fn into_report(self) -> VerificationReport {
        self.report
    }
}

/// Orchestrates verification passes over the closed-world heap snapshot.
///
/// One pass re-scans every entity the analysis currently considers reachable,
/// compares each freshly read slot value against the [`SnapshotStore`], and
/// folds any pending external invalidation into the convergence signal. The
/// store is read-only for the duration of a pass; the analysis engine mutates
/// it strictly between passes.
///
/// The verifier owns a single marker set, reset at the start of each pass.
/// Passes are not reentrant: a second `run_pass` while one is active is a
/// fatal [`ScanError::Concurrency`].
pub struct HeapVerifier<'a> {
    universe: &'a dyn Universe,
    provider: &'a dyn ConstantProvider,
    store: &'a SnapshotStore,
    probes: Vec<&'a dyn InvalidationProbe>,
    runner: TaskRunner,
    visited: ReusableSet,
    pass_active: AtomicBool,
}

impl<'a> HeapVerifier<'a> {
    /// Create a verifier sized to the host's available parallelism.
    #[must_use]
    pub fn new(
        universe: &'a dyn Universe,
        provider: &'a dyn ConstantProvider,
        store: &'a SnapshotStore,
    ) -> Self {
        Self::with_runner(universe, provider, store, TaskRunner::host_sized())
    }

    /// Create a verifier with an explicit worker bound.
    #[must_use]
    pub fn with_workers(
        universe: &'a dyn Universe,
        provider: &'a dyn ConstantProvider,
        store: &'a SnapshotStore,
        workers: usize,
    ) -> Self {
        Self::with_runner(universe, provider, store, TaskRunner::new(workers))
    }

    fn with_runner(
        universe: &'a dyn Universe,
        provider: &'a dyn ConstantProvider,
        store: &'a SnapshotStore,
        runner: TaskRunner,
    ) -> Self {
        Self {
            universe,
            provider,
            store,
            probes: Vec::new(),
            runner,
            visited: ReusableSet::new(),
            pass_active: AtomicBool::new(false),
        }
    }

    /// Install an invalidation probe, polled once at the end of every pass.
    pub fn add_probe(&mut self, probe: &'a dyn InvalidationProbe) {
        self.probes.push(probe);
    }

    /// Run one verification pass.
    ///
    /// Returns the pass outcome; [`PassOutcome::requires_another_round`] is
    /// the convergence signal the orchestrator loops on.
    ///
    /// # Errors
    ///
    /// [`PassError::TaskFailures`] carrying every recoverable host-read
    /// failure collected while the pass drained, or [`PassError::Fatal`]
    /// when an undecomposable value or a contract violation cancelled the
    /// pass.
    pub fn run_pass(&self, phase: &str, during_analysis: bool) -> Result<PassOutcome, PassError> {
        if self.pass_active.swap(true, Ordering::AcqRel) {
            return Err(PassError::Fatal(ScanError::Concurrency(
                "verification pass already active".into(),
            )));
        }
        let result = self.check_heap_snapshot(phase, during_analysis);
        self.pass_active.store(false, Ordering::Release);
        result
    }

    fn check_heap_snapshot(
        &self,
        phase: &str,
        during_analysis: bool,
    ) -> Result<PassOutcome, PassError> {
        #[cfg(feature = "tracing")]
        let _span = crate::tracing::internal::span_pass(
            phase,
            during_analysis,
            crate::tracing::internal::next_pass_id(),
        );

        self.visited.reset();
        let observer = VerifyingObserver::new(self.store);
        let scanner = ObjectScanner::new(self.universe, self.provider, &self.visited, &observer);

        let mut tasks: Vec<ScanTask> = Vec::new();
        for entity in self.universe.reachable_entities() {
            // Candidates the analysis has not promoted yet are skipped.
            if self.universe.is_reachable(entity) {
                tasks.push(ScanTask {
                    root: Constant::Object(entity),
                    reason: ScanReason::Root,
                });
            }
        }
        // Synthetic metadata roots. Lazily constructed metadata objects are
        // often unreachable from program roots, and a type with no instances
        // still gets its metadata verified.
        for ty in self.universe.reachable_types() {
            tasks.push(ScanTask {
                root: self.universe.type_metadata(ty),
                reason: ScanReason::TypeMetadata(ty),
            });
        }

        self.runner
            .run(tasks, |task| scanner.scan(&task.root, task.reason))?;

        // Every probe is polled exactly once per pass, even after an earlier
        // one already forced another round; probes may clear on read.
        let mut external = false;
        for probe in &self.probes {
            external |= probe.pending_invalidation();
        }

        let report = observer.into_report(external);
        #[cfg(feature = "tracing")]
        crate::tracing::internal::log_pass_outcome(&report, during_analysis);

        Ok(PassOutcome {
            phase: phase.to_owned(),
            during_analysis,
            report,
        })
    }
}

/// The comparing observer the verifier installs on the shared scanner.
struct VerifyingObserver<'a> {
    store: &'a SnapshotStore,
    divergences: Mutex<Vec<Divergence>>,
    new_entities: Mutex<BTreeSet<EntityId>>,
}

impl<'a> VerifyingObserver<'a> {
    fn new(store: &'a SnapshotStore) -> Self {
        Self {
            store,
            divergences: Mutex::new(Vec::new()),
            new_entities: Mutex::new(BTreeSet::new()),
        }
    }

    fn flag_if_unsnapshotted(&self, entity: EntityId) {
        if !self.store.contains(entity) {
            self.new_entities.lock().insert(entity);
        }
    }

    fn into_report(self, external_invalidation: bool) -> VerificationReport {
        let mut divergences = self.divergences.into_inner();
        divergences.sort_by_key(|divergence| (divergence.entity, divergence.slot));
        let new_entities = self.new_entities.into_inner().into_iter().collect();
        VerificationReport::new(divergences, new_entities, external_invalidation)
    }
}

impl ScanObserver for VerifyingObserver<'_> {
    fn entity_visited(&self, entity: EntityId, _reason: ScanReason) {
        // An entity the store has never seen must not let the analysis
        // converge, no matter how it was reached.
        self.flag_if_unsnapshotted(entity);
    }

    fn slot_read(&self, entity: EntityId, slot: Slot, value: &Constant) {
        let Some(entry) = self.store.lookup(entity) else {
            // Already flagged as new; slot comparison is meaningless.
            return;
        };
        match entry.slot(slot) {
            Some(recorded) if recorded == value => {}
            recorded => self.divergences.lock().push(Divergence {
                entity,
                slot,
                recorded: recorded.cloned(),
                observed: value.clone(),
            }),
        }
    }

    fn new_reachable(&self, entity: EntityId) {
        self.flag_if_unsnapshotted(entity);
    }
}

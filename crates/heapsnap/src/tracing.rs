//! Structured tracing for verification passes.
//!
//! When the `tracing` feature is enabled, this module provides spans and
//! events correlating everything observed within one pass. All events carry
//! the pass identifier so repeated fixed-point iterations stay
//! distinguishable in a trace.

/// Span and event helpers used by the convergence driver.
#[cfg(feature = "tracing")]
pub mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::report::VerificationReport;

    /// Stable identifier for one verification pass.
    ///
    /// A monotonically increasing counter starting at 1; it correlates all
    /// events emitted within a single pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PassId(pub u64);

    /// Global counter for generating unique pass IDs.
    static NEXT_PASS_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate the next unique pass ID.
    pub fn next_pass_id() -> PassId {
        PassId(NEXT_PASS_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a span covering one whole verification pass.
    pub fn span_pass(
        phase: &str,
        during_analysis: bool,
        pass_id: PassId,
    ) -> ::tracing::span::EnteredSpan {
        ::tracing::span!(
            ::tracing::Level::DEBUG,
            "verify_pass",
            phase = phase,
            during_analysis = during_analysis,
            pass_id = pass_id.0
        )
        .entered()
    }

    /// Log the aggregated outcome of a pass.
    ///
    /// After analysis has finished (`during_analysis == false`) there is no
    /// further round to repair drift, so every finding is raised to WARN.
    pub fn log_pass_outcome(report: &VerificationReport, during_analysis: bool) {
        ::tracing::debug!(
            divergences = report.divergences().len(),
            new_entities = report.new_entities().len(),
            external_invalidation = report.external_invalidation(),
            requires_another_round = report.requires_another_round(),
            "pass_outcome"
        );
        if !during_analysis {
            for divergence in report.divergences() {
                ::tracing::warn!(
                    entity = %divergence.entity,
                    slot = %divergence.slot,
                    recorded = ?divergence.recorded,
                    observed = ?divergence.observed,
                    "post_analysis_divergence"
                );
            }
            for entity in report.new_entities() {
                ::tracing::warn!(entity = %entity, "post_analysis_new_entity");
            }
        }
    }
}

/// Stubs when the `tracing` feature is disabled.
#[cfg(not(feature = "tracing"))]
pub mod internal {
    /// Stub type when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PassId(pub u64);

    /// Stub function when tracing is disabled.
    #[must_use]
    pub fn next_pass_id() -> PassId {
        PassId(0)
    }
}

pub use internal::PassId;

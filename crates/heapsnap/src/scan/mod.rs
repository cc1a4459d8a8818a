//! Parallel object-graph scanning engine.
//!
//! This module provides the traversal infrastructure shared by snapshot
//! construction and snapshot verification:
//! - a resettable concurrent marker set for visited entities,
//! - a bounded worker pool that drains scan tasks and aggregates failures,
//! - the iterative object scanner with its pluggable observer.

mod runner;
mod scanner;
mod visited;

pub use runner::TaskRunner;
pub use scanner::{ObjectScanner, ScanObserver, ScanReason, ScanTask};
pub use visited::ReusableSet;

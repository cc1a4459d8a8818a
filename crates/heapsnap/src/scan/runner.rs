//! Bounded worker pool for scan tasks.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::queue::SegQueue;
use parking_lot::Mutex;

use crate::error::{PassError, ScanError, TaskFailure};
use crate::scan::scanner::ScanTask;

/// Executes scan tasks on a bounded pool of workers and blocks the calling
/// pass until every task completes or the pass is cancelled.
///
/// Failure policy (per task result):
/// - recoverable errors are collected while the rest of the pass drains and
///   re-raised in aggregate once the queue is empty;
/// - fatal errors request fast cancellation: no further tasks are scheduled,
///   already-running tasks finish, and the first fatal error wins.
///
/// There is no timeout at this layer; wall-clock budgets belong to the build
/// orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct TaskRunner {
    workers: usize,
}

impl TaskRunner {
    /// Create a runner with the given worker bound (clamped to at least 1).
    #[must_use]
    pub const fn new(workers: usize) -> Self {
        Self {
            workers: if workers == 0 { 1 } else { workers },
        }
    }

    /// Create a runner sized to the host's available parallelism.
    #[must_use]
    pub fn host_sized() -> Self {
        Self::new(
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        )
    }

    /// The worker bound.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Run every task, blocking until the queue drains or a fatal error
    /// cancels the pass.
    ///
    /// # Errors
    ///
    /// [`PassError::Fatal`] with the first fatal task error, or
    /// [`PassError::TaskFailures`] with every recoverable failure collected
    /// while the pass drained.
    pub fn run<F>(&self, tasks: Vec<ScanTask>, run_task: F) -> Result<(), PassError>
    where
        F: Fn(&ScanTask) -> Result<(), ScanError> + Sync,
    {
        if tasks.is_empty() {
            return Ok(());
        }

        let worker_count = self.workers.min(tasks.len());
        let queue = SegQueue::new();
        for task in tasks {
            queue.push(task);
        }

        let cancelled = AtomicBool::new(false);
        let failures: Mutex<Vec<TaskFailure>> = Mutex::new(Vec::new());
        let fatal: Mutex<Option<ScanError>> = Mutex::new(None);

        std::thread::scope(|s| {
            for _ in 0..worker_count {
                s.spawn(|| {
                    while !cancelled.load(Ordering::Acquire) {
                        let Some(task) = queue.pop() else { break };
                        if let Err(error) = run_task(&task) {
                            if error.is_fatal() {
                                let mut slot = fatal.lock();
                                if slot.is_none() {
                                    *slot = Some(error);
                                }
                                cancelled.store(true, Ordering::Release);
                            } else {
                                failures.lock().push(TaskFailure {
                                    reason: task.reason,
                                    error,
                                });
                            }
                        }
                    }
                });
            }
        });

        if let Some(error) = fatal.into_inner() {
            return Err(PassError::Fatal(error));
        }
        let failures = failures.into_inner();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PassError::TaskFailures(failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::TaskRunner;
    use crate::error::{HostReadError, PassError, ScanError};
    use crate::graph::{Constant, EntityId, FieldId, Slot};
    use crate::scan::scanner::{ScanReason, ScanTask};

    fn root_task(id: u64) -> ScanTask {
        ScanTask {
            root: Constant::Object(EntityId(id)),
            reason: ScanReason::Root,
        }
    }

    #[test]
    fn drains_every_task() {
        let ran = AtomicUsize::new(0);
        let tasks = (0..200).map(root_task).collect();
        TaskRunner::new(4)
            .run(tasks, |_| {
                ran.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .unwrap();
        assert_eq!(ran.load(Ordering::Relaxed), 200);
    }

    #[test]
    fn empty_task_list_is_a_no_op() {
        TaskRunner::new(4).run(Vec::new(), |_| Ok(())).unwrap();
    }

    #[test]
    fn recoverable_failures_drain_and_aggregate() {
        let ran = AtomicUsize::new(0);
        let tasks = (0..50).map(root_task).collect();
        let result = TaskRunner::new(4).run(tasks, |task| {
            ran.fetch_add(1, Ordering::Relaxed);
            let Some(id) = task.root.as_object() else {
                unreachable!()
            };
            if id.0 % 10 == 0 {
                Err(ScanError::from(HostReadError::new(
                    id,
                    Slot::Field(FieldId(0)),
                    "unavailable",
                )))
            } else {
                Ok(())
            }
        });

        // Siblings kept draining; all 50 tasks ran, 5 failures collected.
        assert_eq!(ran.load(Ordering::Relaxed), 50);
        match result {
            Err(PassError::TaskFailures(failures)) => assert_eq!(failures.len(), 5),
            other => panic!("expected aggregate failure, got {other:?}"),
        }
    }

    #[test]
    fn fatal_failure_cancels_the_pass() {
        let tasks = (0..1000).map(root_task).collect();
        let result = TaskRunner::new(2).run(tasks, |task| {
            let Some(id) = task.root.as_object() else {
                unreachable!()
            };
            if id.0 == 0 {
                Err(ScanError::UnsupportedValue { entity: id })
            } else {
                Ok(())
            }
        });

        match result {
            Err(PassError::Fatal(ScanError::UnsupportedValue { entity })) => {
                assert_eq!(entity, EntityId(0));
            }
            other => panic!("expected fatal abort, got {other:?}"),
        }
    }

    #[test]
    fn fatal_wins_over_collected_recoverable_failures() {
        let tasks = vec![root_task(0), root_task(1)];
        let result = TaskRunner::new(1).run(tasks, |task| {
            let Some(id) = task.root.as_object() else {
                unreachable!()
            };
            if id.0 == 0 {
                Err(ScanError::from(HostReadError::new(
                    id,
                    Slot::Element(0),
                    "unavailable",
                )))
            } else {
                Err(ScanError::Concurrency("store mutated mid-pass".into()))
            }
        });
        assert!(matches!(
            result,
            Err(PassError::Fatal(ScanError::Concurrency(_)))
        ));
    }
}

//! Bounded fan-out over data groups
//!
//! Local work items run inline on the calling thread and are merged before
//! any remote task is submitted. Remote items run on a worker pool built for
//! this call only. The caller waits for remote results until the read
//! timeout elapses; stragglers keep running after the pool handle is dropped
//! and their results are discarded.

use crate::error::{ClusterError, Result};
use crate::partition::{Node, PartitionGroup};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Work items split by locality
#[derive(Debug, Clone)]
pub struct WorkPlan<T> {
    local: Vec<(PartitionGroup, T)>,
    remote: Vec<(PartitionGroup, T)>,
}

impl<T> WorkPlan<T> {
    /// Split `items` into groups `this_node` belongs to and the rest
    pub fn split<I>(items: I, this_node: &Node) -> Self
    where
        I: IntoIterator<Item = (PartitionGroup, T)>,
    {
        let (local, remote) = items
            .into_iter()
            .partition(|(group, _)| group.contains(this_node));
        Self { local, remote }
    }

    pub fn local(&self) -> &[(PartitionGroup, T)] {
        &self.local
    }

    pub fn remote(&self) -> &[(PartitionGroup, T)] {
        &self.remote
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }
}

/// Worker count for the remote part of a fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSize {
    /// One worker per remote group
    PerGroup,
    /// At most this many workers
    Fixed(usize),
}

impl PoolSize {
    fn threads(self, remote_items: usize) -> usize {
        let threads = match self {
            PoolSize::PerGroup => remote_items,
            PoolSize::Fixed(cap) => cap.min(remote_items),
        };
        threads.max(1)
    }
}

/// What happened during one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub local: usize,
    pub remote_submitted: usize,
    pub remote_completed: usize,
    /// Remote tasks still running when the deadline passed
    pub timed_out: usize,
}

/// Runs work plans with per-call worker pools
#[derive(Debug, Clone)]
pub struct FanoutExecutor {
    timeout: Duration,
}

impl FanoutExecutor {
    /// `timeout` bounds the wait for remote results
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute `plan`.
    ///
    /// An error from `local` aborts immediately. An error or panic in a
    /// remote task fails the whole call once the join finishes. Remote tasks
    /// that miss the deadline are counted in `timed_out` and contribute
    /// nothing.
    pub fn execute<T, L, R>(
        &self,
        method: &str,
        plan: WorkPlan<T>,
        pool_size: PoolSize,
        mut local: L,
        remote: R,
    ) -> Result<FanoutReport>
    where
        T: Send + 'static,
        L: FnMut(&PartitionGroup, T) -> Result<()>,
        R: Fn(&PartitionGroup, T) -> Result<()> + Send + Sync + 'static,
    {
        let WorkPlan {
            local: local_items,
            remote: remote_items,
        } = plan;
        let mut report = FanoutReport::default();

        for (group, payload) in local_items {
            local(&group, payload)?;
            report.local += 1;
        }

        if remote_items.is_empty() {
            return Ok(report);
        }

        let threads = pool_size.threads(remote_items.len());
        let thread_prefix = method.to_string();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("{}-{}", thread_prefix, i))
            .build()
            .map_err(|e| ClusterError::Execution {
                method: method.to_string(),
                message: format!("cannot build worker pool: {}", e),
            })?;
        debug!(method, threads, tasks = remote_items.len(), "Fanning out to remote groups");

        let remote = Arc::new(remote);
        let (tx, rx) = mpsc::channel();
        for (group, payload) in remote_items {
            let tx = tx.clone();
            let remote = Arc::clone(&remote);
            pool.spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| remote(&group, payload)));
                // the receiver is gone once the caller stops waiting
                let _ = tx.send((group, outcome));
            });
            report.remote_submitted += 1;
        }
        drop(tx);

        let deadline = Instant::now() + self.timeout;
        let mut failure: Option<ClusterError> = None;
        let mut finished = 0;
        while finished < report.remote_submitted {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((group, outcome)) => {
                    finished += 1;
                    match outcome {
                        Ok(Ok(())) => report.remote_completed += 1,
                        Ok(Err(e)) => {
                            error!(method, group = %group, error = %e, "Remote task failed");
                            failure.get_or_insert(e);
                        }
                        Err(payload) => {
                            let message = panic_message(payload.as_ref());
                            error!(method, group = %group, %message, "Remote task panicked");
                            failure.get_or_insert(ClusterError::Execution {
                                method: method.to_string(),
                                message,
                            });
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    report.timed_out = report.remote_submitted - finished;
                    warn!(
                        method,
                        pending = report.timed_out,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Timed out waiting for remote tasks"
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn node(id: &str) -> Node {
        Node::new(id, format!("{}:9003", id))
    }

    fn group(id: &str) -> PartitionGroup {
        PartitionGroup::new(0, vec![node(id)]).unwrap()
    }

    fn plan(ids: &[&str], this_node: &str) -> WorkPlan<usize> {
        WorkPlan::split(
            ids.iter().enumerate().map(|(i, id)| (group(id), i + 1)),
            &node(this_node),
        )
    }

    #[test]
    fn test_split_by_locality() {
        let plan = plan(&["a", "b", "c"], "b");
        assert_eq!(plan.local().len(), 1);
        assert_eq!(plan.remote().len(), 2);
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_local_merged_before_remote_submitted() {
        let executor = FanoutExecutor::new(Duration::from_secs(5));
        let total = Arc::new(AtomicUsize::new(0));
        let seen_local = Arc::new(AtomicUsize::new(0));

        let remote_total = Arc::clone(&total);
        let remote_seen = Arc::clone(&seen_local);
        let report = executor
            .execute(
                "sum",
                plan(&["a", "b", "c"], "a"),
                PoolSize::PerGroup,
                |_, n| {
                    total.fetch_add(n, Ordering::SeqCst);
                    seen_local.store(1, Ordering::SeqCst);
                    Ok(())
                },
                move |_, n| {
                    assert_eq!(remote_seen.load(Ordering::SeqCst), 1);
                    remote_total.fetch_add(n, Ordering::SeqCst);
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(total.load(Ordering::SeqCst), 6);
        assert_eq!(
            report,
            FanoutReport {
                local: 1,
                remote_submitted: 2,
                remote_completed: 2,
                timed_out: 0
            }
        );
    }

    #[test]
    fn test_local_error_is_hard_failure() {
        let executor = FanoutExecutor::new(Duration::from_secs(5));
        let result = executor.execute(
            "sum",
            plan(&["a", "b"], "a"),
            PoolSize::PerGroup,
            |_, _| Err(ClusterError::Metadata("broken".to_string())),
            |_, _| Ok(()),
        );
        assert!(matches!(result, Err(ClusterError::Metadata(_))));
    }

    #[test]
    fn test_remote_panic_fails_call_without_aborting_siblings() {
        let executor = FanoutExecutor::new(Duration::from_secs(5));
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completed);

        let result = executor.execute(
            "count",
            plan(&["a", "b", "c", "d"], "z"),
            PoolSize::Fixed(2),
            |_, _| Ok(()),
            move |_, n| {
                if n == 2 {
                    panic!("bad payload");
                }
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );

        match result {
            Err(ClusterError::Execution { method, message }) => {
                assert_eq!(method, "count");
                assert_eq!(message, "bad payload");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(completed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_slow_task_times_out() {
        let executor = FanoutExecutor::new(Duration::from_millis(100));
        let report = executor
            .execute(
                "slow",
                plan(&["a", "b"], "z"),
                PoolSize::PerGroup,
                |_, _| Ok(()),
                |_, n| {
                    if n == 1 {
                        thread::sleep(Duration::from_millis(1500));
                    }
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(report.remote_completed, 1);
        assert_eq!(report.timed_out, 1);
    }

    #[test]
    fn test_merge_order_independent() {
        let executor = FanoutExecutor::new(Duration::from_secs(5));
        let ids = ["a", "b", "c", "d", "e"];
        let mut results = Vec::new();
        for pool_size in [PoolSize::PerGroup, PoolSize::Fixed(1), PoolSize::Fixed(3)] {
            let set = Arc::new(parking_lot::Mutex::new(std::collections::BTreeSet::new()));
            let remote_set = Arc::clone(&set);
            executor
                .execute(
                    "union",
                    plan(&ids, "z"),
                    pool_size,
                    |_, _| Ok(()),
                    move |g, n| {
                        thread::sleep(Duration::from_millis((5 - n as u64) * 5));
                        remote_set.lock().insert(format!("{}-{}", g.header().node.id, n % 2));
                        Ok(())
                    },
                )
                .unwrap();
            let snapshot = set.lock().clone();
            results.push(snapshot);
        }
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }
}

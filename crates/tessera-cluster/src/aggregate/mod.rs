//! Metadata aggregators
//!
//! Every aggregator follows the same template: work items are split by
//! locality, local groups are answered from the local schema after a group
//! consistency check, remote groups are asked through the invoker, and every
//! partial answer is folded into a shared accumulator. Merges commute, so
//! the arrival order of remote answers never changes the result.

mod children;
mod device_count;
mod node_list;
mod path_count;

pub use children::{ChildrenAggregator, ChildrenKind};
pub use device_count::{device_count_work, DeviceCountAggregator};
pub use node_list::NodeListAggregator;
pub use path_count::{split_by_level, PathCountAggregator};

use crate::context::ClusterContext;
use crate::error::{ClusterError, Result};
use crate::fanout::{PoolSize, WorkPlan};
use crate::invoker::InvokeOutcome;
use crate::partition::{Node, PartitionGroup};
use crate::transport::{DataRequest, DataResponse};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Concurrent integer sum
#[derive(Debug, Default)]
pub struct CountAccumulator(AtomicUsize);

impl CountAccumulator {
    pub fn add(&self, n: usize) {
        self.0.fetch_add(n, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Concurrent ordered set union
#[derive(Debug, Default)]
pub struct OrderedSetAccumulator(Mutex<BTreeSet<String>>);

impl OrderedSetAccumulator {
    pub fn extend<I>(&self, items: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.0.lock().extend(items);
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn snapshot(&self) -> BTreeSet<String> {
        self.0.lock().clone()
    }
}

/// One reducer over per-group answers
pub trait Aggregator: Send + Sync + 'static {
    type Output;

    /// Name used in logs and errors
    fn method(&self) -> &'static str;

    /// Answer `request` from the local schema and merge the result
    fn answer_locally(&self, ctx: &ClusterContext, group: &PartitionGroup, request: &DataRequest) -> Result<()>;

    /// Merge a remote answer
    fn merge_remote(&self, node: &Node, response: DataResponse) -> Result<()>;

    /// Called when the local replica could not catch up with its leader
    fn local_sync_failed(&self, _group: &PartitionGroup, err: ClusterError) -> Result<()> {
        Err(err)
    }

    /// Called when no replica of a remote group answered
    fn remote_exhausted(&self, group: &PartitionGroup, request: &DataRequest) {
        warn!(method = self.method(), group = %group, ?request, "No replica answered, contributing nothing");
    }

    fn finish(&self) -> Result<Self::Output>;
}

/// Run `aggregator` over `work` and return its merged output
pub fn run<A: Aggregator>(
    ctx: &ClusterContext,
    aggregator: A,
    work: Vec<(PartitionGroup, DataRequest)>,
    pool_size: PoolSize,
) -> Result<A::Output> {
    let aggregator = Arc::new(aggregator);
    let plan = WorkPlan::split(work, ctx.this_node());

    let local = Arc::clone(&aggregator);
    let remote = Arc::clone(&aggregator);
    let invoker = Arc::clone(ctx.invoker());

    ctx.fanout().execute(
        aggregator.method(),
        plan,
        pool_size,
        |group, request| match ctx.gate().sync_group(&group.header()) {
            Ok(()) => local.answer_locally(ctx, group, &request),
            Err(e) => local.local_sync_failed(group, e),
        },
        move |group, request| match invoker.invoke(group, &request) {
            InvokeOutcome::Answered { node, response } => remote.merge_remote(&node, response),
            InvokeOutcome::Exhausted => {
                remote.remote_exhausted(group, &request);
                Ok(())
            }
        },
    )?;

    aggregator.finish()
}

fn unexpected_request(method: &str, request: &DataRequest) -> ClusterError {
    ClusterError::Execution {
        method: method.to_string(),
        message: format!("unexpected request {:?}", request),
    }
}

fn unexpected_response(method: &str, node: &Node, response: &DataResponse) -> ClusterError {
    ClusterError::Execution {
        method: method.to_string(),
        message: format!("unexpected response {:?} from {}", response, node),
    }
}

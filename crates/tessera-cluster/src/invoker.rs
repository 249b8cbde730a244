//! Remote invocation with replica fallback
//!
//! A request for a data group is tried on each replica in coordinator order
//! until one node answers. Transport failures evict the connection and move
//! on; an `Unknown` reply also moves on but leaves the connection pooled.

use crate::coordinator::NodeCoordinator;
use crate::error::{TransportError, TransportResult};
use crate::partition::{Node, PartitionGroup, RaftNode};
use crate::pool::ClientPool;
use crate::transport::{DataRequest, DataResponse, NodeReply};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Which client shape carries remote calls
#[derive(Debug, Clone)]
pub enum TransportMode {
    /// Blocking pooled clients
    Sync,
    /// Shared future-based clients driven on this runtime
    Async(Handle),
}

/// Result of trying every replica of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    Answered { node: Node, response: DataResponse },
    /// No replica could be reached or knew the answer
    Exhausted,
}

/// Issues data requests against replica groups
pub struct RemoteInvoker {
    pool: Arc<ClientPool>,
    coordinator: Arc<NodeCoordinator>,
    mode: TransportMode,
    timeout: Duration,
}

impl RemoteInvoker {
    pub fn new(
        pool: Arc<ClientPool>,
        coordinator: Arc<NodeCoordinator>,
        mode: TransportMode,
        timeout: Duration,
    ) -> Self {
        Self {
            pool,
            coordinator,
            mode,
            timeout,
        }
    }

    /// Try the replicas of `group` best-first until one answers.
    ///
    /// Must not be called from a thread driving the async runtime.
    pub fn invoke(&self, group: &PartitionGroup, request: &DataRequest) -> InvokeOutcome {
        let header = group.header();
        for node in self.coordinator.reorder_nodes(group) {
            let started = Instant::now();
            match self.invoke_node(&node, &header, request) {
                Ok(NodeReply::Answer(response)) => {
                    self.coordinator.record_success(&node, started.elapsed());
                    debug!(method = request.method(), group = %group, node = %node, "Remote answer received");
                    return InvokeOutcome::Answered { node, response };
                }
                Ok(NodeReply::Unknown) => {
                    self.coordinator.record_success(&node, started.elapsed());
                    debug!(method = request.method(), group = %group, node = %node, "Node has no answer, trying next replica");
                }
                Err(e) => {
                    self.coordinator.record_failure(&node);
                    warn!(method = request.method(), group = %group, node = %node, error = %e, "Remote call failed, trying next replica");
                }
            }
        }
        InvokeOutcome::Exhausted
    }

    /// One call on one node
    pub fn invoke_node(&self, node: &Node, header: &RaftNode, request: &DataRequest) -> TransportResult<NodeReply> {
        match &self.mode {
            TransportMode::Sync => self
                .pool
                .with_sync_client(node, |client| request.call_sync(client, header)),
            TransportMode::Async(handle) => {
                let client = self.pool.async_client(node)?;
                let timeout = self.timeout;
                let result = handle.block_on(async {
                    match tokio::time::timeout(timeout, request.call_async(client.as_ref(), header)).await {
                        Ok(reply) => reply,
                        Err(_) => Err(TransportError::Timeout {
                            node: node.id.clone(),
                            timeout_ms: timeout.as_millis() as u64,
                        }),
                    }
                });
                if result.is_err() {
                    self.pool.evict_async(node);
                }
                result
            }
        }
    }

    pub fn coordinator(&self) -> &Arc<NodeCoordinator> {
        &self.coordinator
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }
}

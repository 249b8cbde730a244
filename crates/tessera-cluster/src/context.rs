//! Shared cluster collaborators
//!
//! `ClusterContext` is built once at startup and cloned into every executor.
//! All fields are reference counted, so clones share the client pool and the
//! coordinator statistics.

use crate::config::{ClusterConfig, NodeConfig};
use crate::consistency::{ConsensusLayer, ConsistencyGate};
use crate::coordinator::NodeCoordinator;
use crate::error::{ClusterError, Result};
use crate::fanout::FanoutExecutor;
use crate::invoker::{RemoteInvoker, TransportMode};
use crate::metadata::LocalMetadataStore;
use crate::partition::Node;
use crate::pool::ClientPool;
use crate::router::{PartitionTable, PathRouter, SlotPartitionTable};
use crate::transport::ClientFactory;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

#[derive(Clone)]
pub struct ClusterContext {
    config: Arc<ClusterConfig>,
    this_node: Node,
    router: PathRouter,
    gate: ConsistencyGate,
    metadata: Arc<dyn LocalMetadataStore>,
    invoker: Arc<RemoteInvoker>,
    fanout: FanoutExecutor,
}

impl ClusterContext {
    /// Build a context with a slot partition table derived from `config`.
    ///
    /// `runtime` drives the async transport; when `use_async_server` is set
    /// and no handle is given, the current runtime is used.
    pub fn new(
        config: ClusterConfig,
        consensus: Arc<dyn ConsensusLayer>,
        metadata: Arc<dyn LocalMetadataStore>,
        factory: Arc<dyn ClientFactory>,
        runtime: Option<Handle>,
    ) -> Result<Self> {
        config.validate()?;
        let table: Arc<dyn PartitionTable> = Arc::new(SlotPartitionTable::from_config(&config)?);
        Self::with_partition_table(config, table, consensus, metadata, factory, runtime)
    }

    /// Build a context around an existing partition table
    pub fn with_partition_table(
        config: ClusterConfig,
        table: Arc<dyn PartitionTable>,
        consensus: Arc<dyn ConsensusLayer>,
        metadata: Arc<dyn LocalMetadataStore>,
        factory: Arc<dyn ClientFactory>,
        runtime: Option<Handle>,
    ) -> Result<Self> {
        let this_node = config.this_node().map(NodeConfig::to_node).ok_or_else(|| {
            ClusterError::Configuration(format!("node_id '{}' not found in nodes list", config.node_id))
        })?;

        let mode = if config.use_async_server {
            let handle = match runtime {
                Some(handle) => handle,
                None => Handle::try_current().map_err(|_| {
                    ClusterError::Configuration("use_async_server requires a tokio runtime".to_string())
                })?,
            };
            TransportMode::Async(handle)
        } else {
            TransportMode::Sync
        };

        let timeout = config.read_timeout();
        let pool = Arc::new(ClientPool::new(factory, config.max_connections_per_node, timeout));
        let invoker = Arc::new(RemoteInvoker::new(
            pool,
            Arc::new(NodeCoordinator::new()),
            mode,
            timeout,
        ));

        // a remote task may try every replica of its group in turn
        let max_replicas = table.global_groups().iter().map(|g| g.len()).max().unwrap_or(1).max(1);
        let join_timeout = timeout * max_replicas as u32;

        info!(
            node = %this_node,
            cluster = %config.cluster_name,
            groups = table.global_groups().len(),
            async_transport = config.use_async_server,
            "Cluster context initialized"
        );

        Ok(Self {
            gate: ConsistencyGate::new(consensus, config.strict_consistency),
            router: PathRouter::new(table),
            fanout: FanoutExecutor::new(join_timeout),
            config: Arc::new(config),
            this_node,
            metadata,
            invoker,
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn this_node(&self) -> &Node {
        &self.this_node
    }

    pub fn router(&self) -> &PathRouter {
        &self.router
    }

    pub fn gate(&self) -> &ConsistencyGate {
        &self.gate
    }

    pub fn metadata(&self) -> &Arc<dyn LocalMetadataStore> {
        &self.metadata
    }

    pub fn invoker(&self) -> &Arc<RemoteInvoker> {
        &self.invoker
    }

    pub fn fanout(&self) -> &FanoutExecutor {
        &self.fanout
    }
}

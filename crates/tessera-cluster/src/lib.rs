//! Tessera Cluster - Partition-aware metadata query execution
//!
//! This crate answers metadata queries over a sharded, replicated cluster:
//! - Static cluster configuration (TOML-based)
//! - Slot-based routing of storage groups to data groups
//! - Sync-before-read consistency checks against group leaders
//! - Bounded fan-out with local-first merging
//! - Remote invocation with latency-ordered replica fallback and a shared
//!   client pool
//! - Count and listing aggregators for devices, timeseries and tree nodes
//!
//! Consensus, the schema engine and the wire clients are consumed through
//! the `ConsensusLayer`, `LocalMetadataStore` and `ClientFactory` traits.

pub mod aggregate;
pub mod config;
pub mod consistency;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod fanout;
pub mod invoker;
pub mod metadata;
pub mod partition;
pub mod pool;
pub mod router;
pub mod transport;

pub use config::{ClusterConfig, GroupConfig, NodeConfig};
pub use consistency::{ConsensusLayer, ConsistencyGate, StandaloneConsensus};
pub use context::ClusterContext;
pub use coordinator::NodeCoordinator;
pub use error::{ClusterError, ConsistencyError, Result, TransportError, TransportResult};
pub use executor::{ClusterMetadataExecutor, ShowQuery, ShowResult};
pub use fanout::{FanoutExecutor, FanoutReport, PoolSize, WorkPlan};
pub use invoker::{InvokeOutcome, RemoteInvoker, TransportMode};
pub use metadata::{AllStorageGroups, LocalMetadataStore, MemorySchemaStore, StorageGroupFilter};
pub use partition::{Node, PartitionGroup, RaftNode};
pub use pool::{ClientPool, PoolStats};
pub use router::{PartitionTable, PathRouter, SlotPartitionTable, SlotStorageGroupFilter};
pub use transport::{AsyncDataClient, ClientFactory, DataRequest, DataResponse, NodeReply, SyncDataClient};

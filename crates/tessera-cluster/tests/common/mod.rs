#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_cluster::{
    AllStorageGroups, AsyncDataClient, ClientFactory, ClusterConfig, ClusterContext, ClusterError,
    ClusterMetadataExecutor, ConsensusLayer, ConsistencyError, DataRequest, DataResponse, GroupConfig,
    LocalMetadataStore, MemorySchemaStore, Node, NodeConfig, PartitionGroup, PartitionTable, RaftNode,
    StorageGroupFilter, SyncDataClient, TransportError, TransportResult,
};
use tessera_core::PartialPath;
use tokio::runtime::Handle;

pub fn path(s: &str) -> PartialPath {
    PartialPath::new(s).unwrap()
}

// ---------------------------------------------------------------------------
// Consensus
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingConsensus {
    pub meta_calls: AtomicUsize,
    pub group_calls: Mutex<Vec<RaftNode>>,
    pub fail_meta: AtomicBool,
    pub fail_group: AtomicBool,
}

impl ConsensusLayer for RecordingConsensus {
    fn sync_leader_with_consistency_check(&self, _strict: bool) -> Result<(), ConsistencyError> {
        self.meta_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_meta.load(Ordering::SeqCst) {
            return Err(ConsistencyError::new("meta leader unreachable"));
        }
        Ok(())
    }

    fn sync_group_leader_with_consistency_check(
        &self,
        header: &RaftNode,
        _strict: bool,
    ) -> Result<(), ConsistencyError> {
        self.group_calls.lock().push(header.clone());
        if self.fail_group.load(Ordering::SeqCst) {
            return Err(ConsistencyError::new(format!("{} leader unreachable", header)));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// How a scripted node reacts to calls
#[derive(Clone)]
pub enum Behavior {
    /// Answer from this schema
    Serve(Arc<MemorySchemaStore>),
    /// Reachable but does not know the answer
    Unknown,
    /// Fail every call with a timeout
    Timeout,
    /// Block until the client timeout elapses
    Hang,
    /// Refuse connections
    Refuse,
}

#[derive(Default)]
struct Script {
    behaviors: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<Vec<(String, &'static str)>>,
    connections: AtomicUsize,
}

impl Script {
    fn behavior(&self, node: &Node) -> Behavior {
        self.behaviors
            .lock()
            .get(&node.id)
            .cloned()
            .unwrap_or(Behavior::Unknown)
    }

    fn respond(&self, node: &Node, request: DataRequest) -> TransportResult<Option<DataResponse>> {
        self.calls.lock().push((node.id.clone(), request.method()));
        match self.behavior(node) {
            Behavior::Serve(store) => serve(store.as_ref(), &request)
                .map(Some)
                .map_err(|e| TransportError::Protocol {
                    node: node.id.clone(),
                    message: e.to_string(),
                }),
            Behavior::Unknown => Ok(None),
            Behavior::Timeout | Behavior::Hang => Err(TransportError::Timeout {
                node: node.id.clone(),
                timeout_ms: 0,
            }),
            Behavior::Refuse => Err(TransportError::Connection {
                node: node.id.clone(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

fn serve(store: &MemorySchemaStore, request: &DataRequest) -> Result<DataResponse, ClusterError> {
    let response = match request {
        DataRequest::DeviceCount { paths } => {
            let mut count = 0;
            for p in paths {
                count += store.get_devices_num(&PartialPath::new(p)?)?;
            }
            DataResponse::Count(count)
        }
        DataRequest::PathCount { paths, level } => {
            let mut count = 0;
            for p in paths {
                let p = PartialPath::new(p)?;
                count += if *level < 0 {
                    store.get_all_timeseries_count(&p)?
                } else {
                    store.get_nodes_count_in_given_level(&p, *level as usize)?
                };
            }
            DataResponse::Count(count)
        }
        DataRequest::NodeList { path, level } => DataResponse::Paths(
            store
                .get_nodes_list_in_given_level(&PartialPath::new(path)?, *level as usize, &AllStorageGroups)?
                .into_iter()
                .map(String::from)
                .collect(),
        ),
        DataRequest::ChildNodeInNextLevel { path } => {
            DataResponse::Names(store.get_child_node_name_in_next_level(&PartialPath::new(path)?)?)
        }
        DataRequest::ChildNodePathInNextLevel { path } => {
            DataResponse::Names(store.get_child_node_path_in_next_level(&PartialPath::new(path)?)?)
        }
    };
    Ok(response)
}

fn as_count(r: TransportResult<Option<DataResponse>>) -> TransportResult<Option<usize>> {
    r.map(|r| match r {
        Some(DataResponse::Count(n)) => Some(n),
        _ => None,
    })
}

fn as_paths(r: TransportResult<Option<DataResponse>>) -> TransportResult<Option<Vec<String>>> {
    r.map(|r| match r {
        Some(DataResponse::Paths(p)) => Some(p),
        _ => None,
    })
}

fn as_names(r: TransportResult<Option<DataResponse>>) -> TransportResult<Option<BTreeSet<String>>> {
    r.map(|r| match r {
        Some(DataResponse::Names(n)) => Some(n),
        _ => None,
    })
}

/// In-process transport whose nodes follow a script
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, node_id: &str, behavior: Behavior) {
        self.script.behaviors.lock().insert(node_id.to_string(), behavior);
    }

    /// Every call so far as (node id, method)
    pub fn calls(&self) -> Vec<(String, &'static str)> {
        self.script.calls.lock().clone()
    }

    pub fn calls_to(&self, node_id: &str) -> usize {
        self.script.calls.lock().iter().filter(|(n, _)| n == node_id).count()
    }

    pub fn connections(&self) -> usize {
        self.script.connections.load(Ordering::SeqCst)
    }

    fn connect(&self, node: &Node) -> TransportResult<ScriptedClient> {
        if matches!(self.script.behavior(node), Behavior::Refuse) {
            return Err(TransportError::Connection {
                node: node.id.clone(),
                message: "connection refused".to_string(),
            });
        }
        self.script.connections.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedClient {
            node: node.clone(),
            script: Arc::clone(&self.script),
            timeout: Duration::from_secs(1),
        })
    }
}

impl ClientFactory for ScriptedTransport {
    fn sync_client(&self, node: &Node) -> TransportResult<Box<dyn SyncDataClient>> {
        Ok(Box::new(self.connect(node)?))
    }

    fn async_client(&self, node: &Node) -> TransportResult<Arc<dyn AsyncDataClient>> {
        Ok(Arc::new(self.connect(node)?))
    }
}

struct ScriptedClient {
    node: Node,
    script: Arc<Script>,
    timeout: Duration,
}

impl ScriptedClient {
    fn call(&self, request: DataRequest) -> TransportResult<Option<DataResponse>> {
        if matches!(self.script.behavior(&self.node), Behavior::Hang) {
            std::thread::sleep(self.timeout);
        }
        self.script.respond(&self.node, request)
    }

    async fn call_async(&self, request: DataRequest) -> TransportResult<Option<DataResponse>> {
        if matches!(self.script.behavior(&self.node), Behavior::Hang) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.script.respond(&self.node, request)
    }
}

impl SyncDataClient for ScriptedClient {
    fn node(&self) -> &Node {
        &self.node
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn get_device_count(&mut self, _header: &RaftNode, paths: &[String]) -> TransportResult<Option<usize>> {
        as_count(self.call(DataRequest::DeviceCount { paths: paths.to_vec() }))
    }

    fn get_path_count(&mut self, _header: &RaftNode, paths: &[String], level: i32) -> TransportResult<Option<usize>> {
        as_count(self.call(DataRequest::PathCount {
            paths: paths.to_vec(),
            level,
        }))
    }

    fn get_node_list(&mut self, _header: &RaftNode, path: &str, level: i32) -> TransportResult<Option<Vec<String>>> {
        as_paths(self.call(DataRequest::NodeList {
            path: path.to_string(),
            level,
        }))
    }

    fn get_child_node_in_next_level(
        &mut self,
        _header: &RaftNode,
        path: &str,
    ) -> TransportResult<Option<BTreeSet<String>>> {
        as_names(self.call(DataRequest::ChildNodeInNextLevel { path: path.to_string() }))
    }

    fn get_child_node_path_in_next_level(
        &mut self,
        _header: &RaftNode,
        path: &str,
    ) -> TransportResult<Option<BTreeSet<String>>> {
        as_names(self.call(DataRequest::ChildNodePathInNextLevel { path: path.to_string() }))
    }
}

#[async_trait]
impl AsyncDataClient for ScriptedClient {
    fn node(&self) -> &Node {
        &self.node
    }

    async fn get_device_count(&self, _header: &RaftNode, paths: &[String]) -> TransportResult<Option<usize>> {
        as_count(self.call_async(DataRequest::DeviceCount { paths: paths.to_vec() }).await)
    }

    async fn get_path_count(&self, _header: &RaftNode, paths: &[String], level: i32) -> TransportResult<Option<usize>> {
        as_count(
            self.call_async(DataRequest::PathCount {
                paths: paths.to_vec(),
                level,
            })
            .await,
        )
    }

    async fn get_node_list(&self, _header: &RaftNode, path: &str, level: i32) -> TransportResult<Option<Vec<String>>> {
        as_paths(
            self.call_async(DataRequest::NodeList {
                path: path.to_string(),
                level,
            })
            .await,
        )
    }

    async fn get_child_node_in_next_level(
        &self,
        _header: &RaftNode,
        path: &str,
    ) -> TransportResult<Option<BTreeSet<String>>> {
        as_names(
            self.call_async(DataRequest::ChildNodeInNextLevel { path: path.to_string() })
                .await,
        )
    }

    async fn get_child_node_path_in_next_level(
        &self,
        _header: &RaftNode,
        path: &str,
    ) -> TransportResult<Option<BTreeSet<String>>> {
        as_names(
            self.call_async(DataRequest::ChildNodePathInNextLevel { path: path.to_string() })
                .await,
        )
    }
}

// ---------------------------------------------------------------------------
// Partition table
// ---------------------------------------------------------------------------

/// Routes storage groups by an explicit table
pub struct FixedPartitionTable {
    groups: Vec<PartitionGroup>,
    routes: Vec<(PartialPath, usize)>,
}

impl FixedPartitionTable {
    pub fn new(groups: Vec<PartitionGroup>, routes: &[(&str, usize)]) -> Self {
        Self {
            groups,
            routes: routes.iter().map(|(sg, idx)| (path(sg), *idx)).collect(),
        }
    }
}

struct OwnedStorageGroups(HashSet<String>);

impl StorageGroupFilter for OwnedStorageGroups {
    fn satisfy(&self, storage_group: &str) -> bool {
        self.0.contains(storage_group)
    }
}

impl PartitionTable for FixedPartitionTable {
    fn route(&self, storage_group: &PartialPath) -> tessera_cluster::Result<PartitionGroup> {
        self.routes
            .iter()
            .find(|(sg, _)| sg == storage_group)
            .map(|(_, idx)| self.groups[*idx].clone())
            .ok_or_else(|| ClusterError::PartitionTable(format!("no route for {}", storage_group)))
    }

    fn global_groups(&self) -> Vec<PartitionGroup> {
        self.groups.clone()
    }

    fn storage_group_filter(&self, header: &RaftNode) -> Box<dyn StorageGroupFilter> {
        let owned = self
            .routes
            .iter()
            .filter(|(_, idx)| self.groups[*idx].header() == *header)
            .map(|(sg, _)| sg.full_path().to_string())
            .collect();
        Box::new(OwnedStorageGroups(owned))
    }
}

// ---------------------------------------------------------------------------
// Cluster fixture
// ---------------------------------------------------------------------------

/// Four nodes in two groups; this node is node1 in the first group
pub fn two_group_config() -> ClusterConfig {
    let mut config = ClusterConfig::single_node("node1", "10.0.0.1:9003");
    config.nodes = (1..=4)
        .map(|i| NodeConfig::new(format!("node{}", i), format!("10.0.0.{}:9003", i)))
        .collect();
    config.groups = vec![
        GroupConfig::new(0, vec!["node1".to_string(), "node2".to_string()]),
        GroupConfig::new(0, vec!["node3".to_string(), "node4".to_string()]),
    ];
    config.read_operation_timeout_ms = 1_000;
    config
}

/// root.sg.a lives in the local group; root.sg.b and root.ln are remote
pub const ROUTES: &[(&str, usize)] = &[("root.sg.a", 0), ("root.sg.b", 1), ("root.ln", 1)];

pub struct TestCluster {
    pub executor: ClusterMetadataExecutor,
    pub local: Arc<MemorySchemaStore>,
    pub remote: Arc<MemorySchemaStore>,
    pub transport: ScriptedTransport,
    pub consensus: Arc<RecordingConsensus>,
}

impl TestCluster {
    pub fn start(config: ClusterConfig, runtime: Option<Handle>) -> Self {
        let table = FixedPartitionTable::new(config.partition_groups().unwrap(), ROUTES);
        let local = Arc::new(MemorySchemaStore::new());
        let remote = Arc::new(MemorySchemaStore::new());
        let transport = ScriptedTransport::new();
        let consensus = Arc::new(RecordingConsensus::default());

        // every node knows every storage group; timeseries live with their owner
        for (sg, owner) in ROUTES {
            local.set_storage_group(&path(sg)).unwrap();
            if *owner == 1 {
                remote.set_storage_group(&path(sg)).unwrap();
            }
        }
        for ts in ["root.sg.a.d1.s1", "root.sg.a.d2.s1", "root.sg.a.d3.s1"] {
            local.create_timeseries(&path(ts)).unwrap();
        }
        for ts in [
            "root.sg.b.d1.s1",
            "root.sg.b.d2.s1",
            "root.sg.b.d3.s1",
            "root.sg.b.d4.s1",
            "root.ln.wf01.s1",
            "root.ln.wf02.s1",
        ] {
            remote.create_timeseries(&path(ts)).unwrap();
        }

        let ctx = ClusterContext::with_partition_table(
            config,
            Arc::new(table),
            consensus.clone(),
            local.clone(),
            Arc::new(transport.clone()),
            runtime,
        )
        .unwrap();

        Self {
            executor: ClusterMetadataExecutor::new(ctx),
            local,
            remote,
            transport,
            consensus,
        }
    }

    /// Both remote replicas answer from the remote schema
    pub fn serve_remote(&self) {
        self.transport.script("node3", Behavior::Serve(self.remote.clone()));
        self.transport.script("node4", Behavior::Serve(self.remote.clone()));
    }
}

//! Static cluster configuration
//!
//! Provides cluster configuration via TOML files. The configuration is loaded
//! once at process start and handed to `ClusterContext`; nothing reads it
//! through a global.

use crate::error::{ClusterError, Result};
use crate::partition::{Node, PartitionGroup};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tessera_core::LoggingSettings;

/// Cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// This node's unique identifier
    pub node_id: String,
    /// Cluster name (for isolation)
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,
    /// All nodes in the cluster
    pub nodes: Vec<NodeConfig>,
    /// Data groups; the first member of each group is its header
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    /// Number of hash slots storage groups are spread over
    #[serde(default = "default_slot_count")]
    pub slot_count: u32,
    /// Use the callback/future based client instead of the blocking one
    #[serde(default)]
    pub use_async_server: bool,
    /// Timeout of a single remote read, also bounds fan-out joins
    #[serde(default = "default_read_operation_timeout_ms")]
    pub read_operation_timeout_ms: u64,
    /// Worker count for fan-outs that query every group
    #[serde(default = "default_broadcast_pool_size")]
    pub broadcast_pool_size: usize,
    /// Idle connections kept per remote node
    #[serde(default = "default_max_connections_per_node")]
    pub max_connections_per_node: usize,
    /// Passed to every consistency check
    #[serde(default)]
    pub strict_consistency: bool,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_cluster_name() -> String {
    "tessera".to_string()
}

fn default_slot_count() -> u32 {
    10_000
}

fn default_read_operation_timeout_ms() -> u64 {
    30_000
}

fn default_broadcast_pool_size() -> usize {
    6
}

fn default_max_connections_per_node() -> usize {
    8
}

/// Configuration for a single node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identifier
    pub id: String,
    /// Node address (host:port)
    pub address: String,
    /// Optional node tags/labels
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl NodeConfig {
    /// Create a new node configuration
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            tags: HashMap::new(),
        }
    }

    /// The runtime node identity
    pub fn to_node(&self) -> Node {
        Node::new(self.id.clone(), self.address.clone())
    }
}

/// Configuration for a data group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Raft group id
    #[serde(default)]
    pub raft_id: u32,
    /// Member node ids, header first
    pub members: Vec<String>,
}

impl GroupConfig {
    pub fn new(raft_id: u32, members: Vec<String>) -> Self {
        Self { raft_id, members }
    }
}

impl ClusterConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ClusterError::Configuration(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ClusterError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Create a single-node configuration (for standalone mode)
    pub fn single_node(node_id: impl Into<String>, address: impl Into<String>) -> Self {
        let node_id = node_id.into();

        Self {
            node_id: node_id.clone(),
            cluster_name: default_cluster_name(),
            nodes: vec![NodeConfig::new(node_id.clone(), address)],
            groups: vec![GroupConfig::new(0, vec![node_id])],
            slot_count: default_slot_count(),
            use_async_server: false,
            read_operation_timeout_ms: default_read_operation_timeout_ms(),
            broadcast_pool_size: default_broadcast_pool_size(),
            max_connections_per_node: default_max_connections_per_node(),
            strict_consistency: false,
            logging: LoggingSettings::default(),
        }
    }

    /// Get this node's configuration
    pub fn this_node(&self) -> Option<&NodeConfig> {
        self.get_node(&self.node_id)
    }

    /// Get a node by ID
    pub fn get_node(&self, node_id: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// Read operation timeout as a `Duration`
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_operation_timeout_ms)
    }

    /// Resolve the configured groups into partition groups
    pub fn partition_groups(&self) -> Result<Vec<PartitionGroup>> {
        self.groups
            .iter()
            .map(|group| {
                let nodes = group
                    .members
                    .iter()
                    .map(|id| {
                        self.get_node(id).map(NodeConfig::to_node).ok_or_else(|| {
                            ClusterError::Configuration(format!(
                                "Group {} references unknown node '{}'",
                                group.raft_id, id
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                PartitionGroup::new(group.raft_id, nodes)
            })
            .collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Check node_id exists in nodes
        if self.this_node().is_none() {
            return Err(ClusterError::Configuration(format!(
                "node_id '{}' not found in nodes list",
                self.node_id
            )));
        }

        let mut seen_nodes = HashSet::new();
        for node in &self.nodes {
            if !seen_nodes.insert(node.id.as_str()) {
                return Err(ClusterError::Configuration(format!(
                    "Node '{}' is defined more than once",
                    node.id
                )));
            }
        }

        if self.groups.is_empty() {
            return Err(ClusterError::Configuration(
                "At least one data group must be configured".to_string(),
            ));
        }

        // A group is identified by its header and raft id
        let mut seen_headers = HashSet::new();
        for group in &self.groups {
            let header = group.members.first().ok_or_else(|| {
                ClusterError::Configuration(format!("Group {} has no members", group.raft_id))
            })?;
            if !seen_headers.insert((header.as_str(), group.raft_id)) {
                return Err(ClusterError::Configuration(format!(
                    "Group with header '{}' and raft id {} is defined more than once",
                    header, group.raft_id
                )));
            }
        }
        self.partition_groups()?;

        if (self.slot_count as usize) < self.groups.len() {
            return Err(ClusterError::Configuration(format!(
                "slot_count {} is smaller than group count {}",
                self.slot_count,
                self.groups.len()
            )));
        }

        if self.broadcast_pool_size == 0 {
            return Err(ClusterError::Configuration(
                "broadcast_pool_size must be positive".to_string(),
            ));
        }

        if self.read_operation_timeout_ms == 0 {
            return Err(ClusterError::Configuration(
                "read_operation_timeout_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::single_node("node1", "127.0.0.1:9003")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const THREE_NODES: &str = r#"
        node_id = "node1"
        cluster_name = "test-cluster"
        slot_count = 64
        use_async_server = true
        read_operation_timeout_ms = 500

        [[nodes]]
        id = "node1"
        address = "10.0.1.1:9003"

        [[nodes]]
        id = "node2"
        address = "10.0.1.2:9003"

        [[nodes]]
        id = "node3"
        address = "10.0.1.3:9003"

        [[groups]]
        raft_id = 0
        members = ["node1", "node2"]

        [[groups]]
        raft_id = 0
        members = ["node2", "node3"]

        [[groups]]
        raft_id = 0
        members = ["node3", "node1"]
    "#;

    #[test]
    fn test_single_node_config() {
        let config = ClusterConfig::single_node("test-node", "127.0.0.1:9003");

        assert_eq!(config.node_id, "test-node");
        assert_eq!(config.nodes.len(), 1);
        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.broadcast_pool_size, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = ClusterConfig::from_toml(THREE_NODES).unwrap();

        assert_eq!(config.cluster_name, "test-cluster");
        assert!(config.use_async_server);
        assert_eq!(config.read_timeout(), Duration::from_millis(500));
        assert_eq!(config.max_connections_per_node, 8);
        assert!(config.validate().is_ok());

        let groups = config.partition_groups().unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1].header().node.id, "node2");
        assert!(groups[2].contains(&Node::new("node1", "10.0.1.1:9003")));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(THREE_NODES.as_bytes()).unwrap();

        let config = ClusterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.nodes.len(), 3);

        assert!(ClusterConfig::from_file("/nonexistent/tessera.toml").is_err());
    }

    #[test]
    fn test_validation_unknown_member() {
        let toml = r#"
            node_id = "node1"

            [[nodes]]
            id = "node1"
            address = "10.0.1.1:9003"

            [[groups]]
            members = ["node1", "node9"]
        "#;

        let config = ClusterConfig::from_toml(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_duplicate_group() {
        let toml = r#"
            node_id = "node1"

            [[nodes]]
            id = "node1"
            address = "10.0.1.1:9003"

            [[groups]]
            members = ["node1"]

            [[groups]]
            members = ["node1"]
        "#;

        let config = ClusterConfig::from_toml(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_missing_this_node() {
        let mut config = ClusterConfig::single_node("node1", "127.0.0.1:9003");
        config.node_id = "node7".to_string();
        assert!(config.validate().is_err());
    }
}

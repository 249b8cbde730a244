//! Nodes and partition groups
//!
//! A partition group (data group) is an ordered replica set that jointly owns
//! one partition of the key space. Its identity is the header node (first
//! member) together with the raft group id.

use crate::error::{ClusterError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A cluster member
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier
    pub id: String,
    /// Node address (host:port)
    pub address: String,
}

impl Node {
    /// Create a new node
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

/// Header identity of a data group, sent with every remote request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RaftNode {
    /// Header node of the group
    pub node: Node,
    /// Raft group id
    pub raft_id: u32,
}

impl RaftNode {
    pub fn new(node: Node, raft_id: u32) -> Self {
        Self { node, raft_id }
    }
}

impl fmt::Display for RaftNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.node.id, self.raft_id)
    }
}

/// An ordered, non-empty replica set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionGroup {
    raft_id: u32,
    nodes: Vec<Node>,
}

impl PartitionGroup {
    /// Create a group; the first node becomes the header
    pub fn new(raft_id: u32, nodes: Vec<Node>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(ClusterError::PartitionTable(format!(
                "partition group {} has no nodes",
                raft_id
            )));
        }
        let mut deduped: Vec<Node> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !deduped.contains(&node) {
                deduped.push(node);
            }
        }
        Ok(Self {
            raft_id,
            nodes: deduped,
        })
    }

    /// Raft group id
    pub fn raft_id(&self) -> u32 {
        self.raft_id
    }

    /// Header identity
    pub fn header(&self) -> RaftNode {
        RaftNode::new(self.nodes[0].clone(), self.raft_id)
    }

    /// Replica nodes in group order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of replicas
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false, groups are never empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `node` is one of the replicas
    pub fn contains(&self, node: &Node) -> bool {
        self.nodes.iter().any(|n| n.id == node.id)
    }
}

impl fmt::Display for PartitionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        write!(f, "[{}] (raft {})", ids.join(", "), self.raft_id)
    }
}

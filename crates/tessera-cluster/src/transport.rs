//! Data client contracts
//!
//! Two interchangeable client shapes expose the same metadata surface: a
//! blocking client owned by one caller at a time, and a future-based client
//! shared across callers. Every call is addressed to a data group header.
//!
//! `Ok(None)` means the node was reachable but has no answer for the group;
//! the invoker then moves on to the next replica.

use crate::error::TransportResult;
use crate::partition::{Node, RaftNode};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Blocking data client
pub trait SyncDataClient: Send + Sync {
    /// Node this client is connected to
    fn node(&self) -> &Node;

    /// Per-call timeout
    fn set_timeout(&mut self, timeout: Duration);

    fn get_device_count(&mut self, header: &RaftNode, paths: &[String]) -> TransportResult<Option<usize>>;

    fn get_path_count(&mut self, header: &RaftNode, paths: &[String], level: i32) -> TransportResult<Option<usize>>;

    fn get_node_list(&mut self, header: &RaftNode, path: &str, level: i32) -> TransportResult<Option<Vec<String>>>;

    fn get_child_node_in_next_level(
        &mut self,
        header: &RaftNode,
        path: &str,
    ) -> TransportResult<Option<BTreeSet<String>>>;

    fn get_child_node_path_in_next_level(
        &mut self,
        header: &RaftNode,
        path: &str,
    ) -> TransportResult<Option<BTreeSet<String>>>;
}

/// Future-based data client
#[async_trait]
pub trait AsyncDataClient: Send + Sync {
    /// Node this client is connected to
    fn node(&self) -> &Node;

    async fn get_device_count(&self, header: &RaftNode, paths: &[String]) -> TransportResult<Option<usize>>;

    async fn get_path_count(&self, header: &RaftNode, paths: &[String], level: i32) -> TransportResult<Option<usize>>;

    async fn get_node_list(&self, header: &RaftNode, path: &str, level: i32) -> TransportResult<Option<Vec<String>>>;

    async fn get_child_node_in_next_level(
        &self,
        header: &RaftNode,
        path: &str,
    ) -> TransportResult<Option<BTreeSet<String>>>;

    async fn get_child_node_path_in_next_level(
        &self,
        header: &RaftNode,
        path: &str,
    ) -> TransportResult<Option<BTreeSet<String>>>;
}

/// Opens connections to cluster nodes
pub trait ClientFactory: Send + Sync {
    fn sync_client(&self, node: &Node) -> TransportResult<Box<dyn SyncDataClient>>;

    fn async_client(&self, node: &Node) -> TransportResult<Arc<dyn AsyncDataClient>>;
}

/// A batched request for one data group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataRequest {
    DeviceCount { paths: Vec<String> },
    PathCount { paths: Vec<String>, level: i32 },
    NodeList { path: String, level: i32 },
    ChildNodeInNextLevel { path: String },
    ChildNodePathInNextLevel { path: String },
}

/// Decoded answer of a reachable node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataResponse {
    Count(usize),
    Paths(Vec<String>),
    Names(BTreeSet<String>),
}

/// Outcome of one call on a reachable node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeReply {
    Answer(DataResponse),
    /// The node does not own or does not know the answer
    Unknown,
}

impl From<Option<DataResponse>> for NodeReply {
    fn from(response: Option<DataResponse>) -> Self {
        match response {
            Some(response) => NodeReply::Answer(response),
            None => NodeReply::Unknown,
        }
    }
}

impl DataRequest {
    /// Method name used in logs and errors
    pub fn method(&self) -> &'static str {
        match self {
            DataRequest::DeviceCount { .. } => "getDeviceCount",
            DataRequest::PathCount { .. } => "getPathCount",
            DataRequest::NodeList { .. } => "getNodeList",
            DataRequest::ChildNodeInNextLevel { .. } => "getChildNodeInNextLevel",
            DataRequest::ChildNodePathInNextLevel { .. } => "getChildNodePathInNextLevel",
        }
    }

    /// Issue this request on a blocking client
    pub fn call_sync(&self, client: &mut dyn SyncDataClient, header: &RaftNode) -> TransportResult<NodeReply> {
        let response = match self {
            DataRequest::DeviceCount { paths } => client.get_device_count(header, paths)?.map(DataResponse::Count),
            DataRequest::PathCount { paths, level } => {
                client.get_path_count(header, paths, *level)?.map(DataResponse::Count)
            }
            DataRequest::NodeList { path, level } => client.get_node_list(header, path, *level)?.map(DataResponse::Paths),
            DataRequest::ChildNodeInNextLevel { path } => {
                client.get_child_node_in_next_level(header, path)?.map(DataResponse::Names)
            }
            DataRequest::ChildNodePathInNextLevel { path } => {
                client.get_child_node_path_in_next_level(header, path)?.map(DataResponse::Names)
            }
        };
        Ok(response.into())
    }

    /// Issue this request on a future-based client
    pub async fn call_async(&self, client: &dyn AsyncDataClient, header: &RaftNode) -> TransportResult<NodeReply> {
        let response = match self {
            DataRequest::DeviceCount { paths } => {
                client.get_device_count(header, paths).await?.map(DataResponse::Count)
            }
            DataRequest::PathCount { paths, level } => {
                client.get_path_count(header, paths, *level).await?.map(DataResponse::Count)
            }
            DataRequest::NodeList { path, level } => {
                client.get_node_list(header, path, *level).await?.map(DataResponse::Paths)
            }
            DataRequest::ChildNodeInNextLevel { path } => {
                client.get_child_node_in_next_level(header, path).await?.map(DataResponse::Names)
            }
            DataRequest::ChildNodePathInNextLevel { path } => {
                client.get_child_node_path_in_next_level(header, path).await?.map(DataResponse::Names)
            }
        };
        Ok(response.into())
    }
}

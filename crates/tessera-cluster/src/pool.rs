//! Shared data client pool
//!
//! Blocking clients are checked out exclusively and returned after a
//! successful call. A client that saw any transport error is dropped instead
//! of being returned, since its connection state is unknown.

use crate::error::TransportResult;
use crate::partition::Node;
use crate::transport::{AsyncDataClient, ClientFactory, SyncDataClient};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub created: u64,
    pub reused: u64,
    pub evicted: u64,
}

/// Per-node pool of data clients
pub struct ClientPool {
    factory: Arc<dyn ClientFactory>,
    max_idle_per_node: usize,
    timeout: Duration,
    idle: DashMap<String, Vec<Box<dyn SyncDataClient>>>,
    shared: DashMap<String, Arc<dyn AsyncDataClient>>,
    created: AtomicU64,
    reused: AtomicU64,
    evicted: AtomicU64,
}

impl ClientPool {
    pub fn new(factory: Arc<dyn ClientFactory>, max_idle_per_node: usize, timeout: Duration) -> Self {
        Self {
            factory,
            max_idle_per_node,
            timeout,
            idle: DashMap::new(),
            shared: DashMap::new(),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Check out a blocking client for `node`, opening one if none is idle
    pub fn acquire(&self, node: &Node) -> TransportResult<Box<dyn SyncDataClient>> {
        let pooled = self.idle.get_mut(&node.id).and_then(|mut idle| idle.pop());
        let mut client = match pooled {
            Some(client) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                client
            }
            None => {
                let client = self.factory.sync_client(node)?;
                self.created.fetch_add(1, Ordering::Relaxed);
                client
            }
        };
        client.set_timeout(self.timeout);
        Ok(client)
    }

    /// Return a healthy client
    pub fn release(&self, client: Box<dyn SyncDataClient>) {
        let mut idle = self.idle.entry(client.node().id.clone()).or_default();
        if idle.len() < self.max_idle_per_node {
            idle.push(client);
        }
    }

    /// Drop a client whose connection is broken
    pub fn discard(&self, client: Box<dyn SyncDataClient>) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
        debug!(node = %client.node(), "Discarding broken data client");
    }

    /// Run `f` on a pooled client, recycling it only on success
    pub fn with_sync_client<T, F>(&self, node: &Node, f: F) -> TransportResult<T>
    where
        F: FnOnce(&mut dyn SyncDataClient) -> TransportResult<T>,
    {
        let mut client = self.acquire(node)?;
        match f(client.as_mut()) {
            Ok(value) => {
                self.release(client);
                Ok(value)
            }
            Err(e) => {
                self.discard(client);
                Err(e)
            }
        }
    }

    /// Shared future-based client for `node`
    pub fn async_client(&self, node: &Node) -> TransportResult<Arc<dyn AsyncDataClient>> {
        if let Some(client) = self.shared.get(&node.id) {
            self.reused.fetch_add(1, Ordering::Relaxed);
            return Ok(client.clone());
        }
        let client = self.factory.async_client(node)?;
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(self.shared.entry(node.id.clone()).or_insert(client).clone())
    }

    /// Forget the shared client for `node` after a transport error
    pub fn evict_async(&self, node: &Node) {
        if self.shared.remove(&node.id).is_some() {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            debug!(node = %node, "Evicted async data client");
        }
    }

    /// Idle blocking clients held for `node`
    pub fn idle_count(&self, node: &Node) -> usize {
        self.idle.get(&node.id).map(|idle| idle.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::partition::RaftNode;
    use std::collections::BTreeSet;

    struct EchoClient {
        node: Node,
        timeout: Duration,
    }

    impl SyncDataClient for EchoClient {
        fn node(&self) -> &Node {
            &self.node
        }

        fn set_timeout(&mut self, timeout: Duration) {
            self.timeout = timeout;
        }

        fn get_device_count(&mut self, _header: &RaftNode, paths: &[String]) -> TransportResult<Option<usize>> {
            Ok(Some(paths.len()))
        }

        fn get_path_count(&mut self, _header: &RaftNode, _paths: &[String], _level: i32) -> TransportResult<Option<usize>> {
            Err(TransportError::Timeout {
                node: self.node.id.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            })
        }

        fn get_node_list(&mut self, _header: &RaftNode, _path: &str, _level: i32) -> TransportResult<Option<Vec<String>>> {
            Ok(None)
        }

        fn get_child_node_in_next_level(
            &mut self,
            _header: &RaftNode,
            _path: &str,
        ) -> TransportResult<Option<BTreeSet<String>>> {
            Ok(None)
        }

        fn get_child_node_path_in_next_level(
            &mut self,
            _header: &RaftNode,
            _path: &str,
        ) -> TransportResult<Option<BTreeSet<String>>> {
            Ok(None)
        }
    }

    struct EchoFactory;

    impl ClientFactory for EchoFactory {
        fn sync_client(&self, node: &Node) -> TransportResult<Box<dyn SyncDataClient>> {
            Ok(Box::new(EchoClient {
                node: node.clone(),
                timeout: Duration::ZERO,
            }))
        }

        fn async_client(&self, node: &Node) -> TransportResult<Arc<dyn AsyncDataClient>> {
            Err(TransportError::Connection {
                node: node.id.clone(),
                message: "async transport disabled".to_string(),
            })
        }
    }

    fn pool(max_idle: usize) -> ClientPool {
        ClientPool::new(Arc::new(EchoFactory), max_idle, Duration::from_millis(250))
    }

    #[test]
    fn test_client_reused_after_success() {
        let pool = pool(4);
        let node = Node::new("node2", "10.0.0.2:9003");
        let header = RaftNode::new(node.clone(), 0);

        for _ in 0..3 {
            let count = pool
                .with_sync_client(&node, |c| c.get_device_count(&header, &["root.sg.d1".to_string()]))
                .unwrap();
            assert_eq!(count, Some(1));
        }

        assert_eq!(pool.idle_count(&node), 1);
        assert_eq!(pool.stats(), PoolStats { created: 1, reused: 2, evicted: 0 });
    }

    #[test]
    fn test_client_discarded_after_error() {
        let pool = pool(4);
        let node = Node::new("node2", "10.0.0.2:9003");
        let header = RaftNode::new(node.clone(), 0);

        let result = pool.with_sync_client(&node, |c| c.get_path_count(&header, &[], 1));
        assert_eq!(
            result,
            Err(TransportError::Timeout {
                node: "node2".to_string(),
                timeout_ms: 250
            })
        );
        assert_eq!(pool.idle_count(&node), 0);
        assert_eq!(pool.stats().evicted, 1);
    }

    #[test]
    fn test_idle_bound() {
        let pool = pool(1);
        let node = Node::new("node3", "10.0.0.3:9003");
        let a = pool.acquire(&node).unwrap();
        let b = pool.acquire(&node).unwrap();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle_count(&node), 1);
    }

    #[test]
    fn test_async_factory_error_propagates() {
        let pool = pool(1);
        assert!(pool.async_client(&Node::new("node3", "10.0.0.3:9003")).is_err());
        assert_eq!(pool.stats().created, 0);
    }
}

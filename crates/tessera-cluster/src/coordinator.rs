//! Replica ordering
//!
//! Keeps a smoothed round-trip latency per node and orders the replicas of a
//! group best-first before each remote call.

use crate::partition::{Node, PartitionGroup};
use dashmap::DashMap;
use std::time::Duration;

/// Weight of the newest sample in the moving average
const LATENCY_SMOOTHING: f64 = 0.3;

#[derive(Debug, Clone, Copy, Default)]
struct NodeStatus {
    latency_ms: Option<f64>,
    last_failed: bool,
    failures: u64,
}

/// Latency-aware replica selector
#[derive(Default)]
pub struct NodeCoordinator {
    status: DashMap<String, NodeStatus>,
}

impl NodeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replicas of `group` ordered best candidate first.
    ///
    /// Healthy nodes with a latency sample come first (fastest first), then
    /// nodes never measured in group order, then nodes whose last call failed.
    pub fn reorder_nodes(&self, group: &PartitionGroup) -> Vec<Node> {
        let mut ranked: Vec<(u8, f64, usize, &Node)> = group
            .nodes()
            .iter()
            .enumerate()
            .map(|(idx, node)| {
                let status = self.status.get(&node.id).map(|s| *s).unwrap_or_default();
                let tier = match (status.last_failed, status.latency_ms) {
                    (true, _) => 2,
                    (false, Some(_)) => 0,
                    (false, None) => 1,
                };
                (tier, status.latency_ms.unwrap_or(0.0), idx, node)
            })
            .collect();

        ranked.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.total_cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        ranked.into_iter().map(|(_, _, _, node)| node.clone()).collect()
    }

    /// Record a call that reached `node`
    pub fn record_success(&self, node: &Node, elapsed: Duration) {
        let sample = elapsed.as_secs_f64() * 1000.0;
        let mut status = self.status.entry(node.id.clone()).or_default();
        status.latency_ms = Some(match status.latency_ms {
            Some(prev) => prev + LATENCY_SMOOTHING * (sample - prev),
            None => sample,
        });
        status.last_failed = false;
    }

    /// Record a call that failed to reach `node`
    pub fn record_failure(&self, node: &Node) {
        let mut status = self.status.entry(node.id.clone()).or_default();
        status.last_failed = true;
        status.failures += 1;
    }

    /// Smoothed latency of `node` in milliseconds
    pub fn latency_ms(&self, node: &Node) -> Option<f64> {
        self.status.get(&node.id).and_then(|s| s.latency_ms)
    }

    /// Total failures recorded for `node`
    pub fn failures(&self, node: &Node) -> u64 {
        self.status.get(&node.id).map(|s| s.failures).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> Node {
        Node::new(id, format!("{}:9003", id))
    }

    fn ids(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_unmeasured_keeps_group_order() {
        let coordinator = NodeCoordinator::new();
        let group = PartitionGroup::new(0, vec![node("a"), node("b"), node("c")]).unwrap();
        assert_eq!(ids(&coordinator.reorder_nodes(&group)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_fastest_first_failed_last() {
        let coordinator = NodeCoordinator::new();
        let group = PartitionGroup::new(0, vec![node("a"), node("b"), node("c"), node("d")]).unwrap();

        coordinator.record_success(&node("c"), Duration::from_millis(5));
        coordinator.record_success(&node("b"), Duration::from_millis(40));
        coordinator.record_failure(&node("a"));

        assert_eq!(ids(&coordinator.reorder_nodes(&group)), vec!["c", "b", "d", "a"]);
        assert_eq!(coordinator.failures(&node("a")), 1);
    }

    #[test]
    fn test_recovery_and_smoothing() {
        let coordinator = NodeCoordinator::new();
        let a = node("a");

        coordinator.record_failure(&a);
        coordinator.record_success(&a, Duration::from_millis(10));
        coordinator.record_success(&a, Duration::from_millis(20));

        let latency = coordinator.latency_ms(&a).unwrap();
        assert!((latency - 13.0).abs() < 1e-6);
        let group = PartitionGroup::new(0, vec![node("b"), a.clone()]).unwrap();
        assert_eq!(ids(&coordinator.reorder_nodes(&group)), vec!["a", "b"]);
    }
}

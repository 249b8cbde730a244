use super::{unexpected_request, unexpected_response, Aggregator, OrderedSetAccumulator};
use crate::context::ClusterContext;
use crate::error::{ClusterError, Result};
use crate::partition::{Node, PartitionGroup};
use crate::transport::{DataRequest, DataResponse};
use std::collections::BTreeSet;
use tessera_core::PartialPath;
use tracing::error;

/// Whether children are reported by name or by full path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildrenKind {
    Names,
    Paths,
}

/// Unions next-level children across groups.
///
/// Local failures degrade to an empty contribution instead of failing the
/// listing.
#[derive(Debug)]
pub struct ChildrenAggregator {
    kind: ChildrenKind,
    children: OrderedSetAccumulator,
}

impl ChildrenAggregator {
    pub fn new(kind: ChildrenKind) -> Self {
        Self {
            kind,
            children: OrderedSetAccumulator::default(),
        }
    }

    /// The broadcast request for `path`
    pub fn request(&self, path: &PartialPath) -> DataRequest {
        let path = path.full_path().to_string();
        match self.kind {
            ChildrenKind::Names => DataRequest::ChildNodeInNextLevel { path },
            ChildrenKind::Paths => DataRequest::ChildNodePathInNextLevel { path },
        }
    }
}

impl Aggregator for ChildrenAggregator {
    type Output = BTreeSet<String>;

    fn method(&self) -> &'static str {
        match self.kind {
            ChildrenKind::Names => "getChildNodeInNextLevel",
            ChildrenKind::Paths => "getChildNodePathInNextLevel",
        }
    }

    fn answer_locally(&self, ctx: &ClusterContext, group: &PartitionGroup, request: &DataRequest) -> Result<()> {
        let path = match (self.kind, request) {
            (ChildrenKind::Names, DataRequest::ChildNodeInNextLevel { path })
            | (ChildrenKind::Paths, DataRequest::ChildNodePathInNextLevel { path }) => PartialPath::new(path)?,
            _ => return Err(unexpected_request(self.method(), request)),
        };
        let children = match self.kind {
            ChildrenKind::Names => ctx.metadata().get_child_node_name_in_next_level(&path),
            ChildrenKind::Paths => ctx.metadata().get_child_node_path_in_next_level(&path),
        };
        match children {
            Ok(children) => self.children.extend(children),
            Err(e) => {
                error!(group = %group, %path, error = %e, "Cannot get next children locally");
            }
        }
        Ok(())
    }

    fn merge_remote(&self, node: &Node, response: DataResponse) -> Result<()> {
        match response {
            DataResponse::Names(children) => {
                self.children.extend(children);
                Ok(())
            }
            other => Err(unexpected_response(self.method(), node, &other)),
        }
    }

    fn local_sync_failed(&self, group: &PartitionGroup, err: ClusterError) -> Result<()> {
        error!(method = self.method(), group = %group, error = %err, "Fail to get next children");
        Ok(())
    }

    fn remote_exhausted(&self, group: &PartitionGroup, request: &DataRequest) {
        error!(method = self.method(), group = %group, ?request, "Fail to get next children");
    }

    fn finish(&self) -> Result<BTreeSet<String>> {
        Ok(self.children.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape_follows_kind() {
        let path = PartialPath::new("root.sg").unwrap();
        assert_eq!(
            ChildrenAggregator::new(ChildrenKind::Names).request(&path),
            DataRequest::ChildNodeInNextLevel {
                path: "root.sg".to_string()
            }
        );
        assert_eq!(
            ChildrenAggregator::new(ChildrenKind::Paths).method(),
            "getChildNodePathInNextLevel"
        );
    }

    #[test]
    fn test_remote_names_union() {
        let aggregator = ChildrenAggregator::new(ChildrenKind::Names);
        let node = Node::new("node2", "10.0.0.2:9003");
        aggregator
            .merge_remote(&node, DataResponse::Names(["d2", "d1"].iter().map(|s| s.to_string()).collect()))
            .unwrap();
        aggregator
            .merge_remote(&node, DataResponse::Names(["d1"].iter().map(|s| s.to_string()).collect()))
            .unwrap();
        assert_eq!(aggregator.finish().unwrap().len(), 2);
    }
}

use super::{unexpected_request, unexpected_response, Aggregator, OrderedSetAccumulator};
use crate::context::ClusterContext;
use crate::error::Result;
use crate::partition::{Node, PartitionGroup};
use crate::transport::{DataRequest, DataResponse};
use tessera_core::PartialPath;
use tracing::{debug, error};

/// Unions the level nodes reported by every group
#[derive(Debug, Default)]
pub struct NodeListAggregator {
    nodes: OrderedSetAccumulator,
}

impl NodeListAggregator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregator for NodeListAggregator {
    type Output = Vec<PartialPath>;

    fn method(&self) -> &'static str {
        "getNodesList"
    }

    fn answer_locally(&self, ctx: &ClusterContext, group: &PartitionGroup, request: &DataRequest) -> Result<()> {
        let DataRequest::NodeList { path, level } = request else {
            return Err(unexpected_request(self.method(), request));
        };
        let pattern = PartialPath::new(path)?;
        // only report storage groups this group owns
        let filter = ctx.router().group_filter(&group.header());
        let nodes = ctx
            .metadata()
            .get_nodes_list_in_given_level(&pattern, (*level).max(0) as usize, filter.as_ref())
            .map_err(|e| {
                error!(group = %group, %pattern, level, error = %e, "Cannot get node list locally");
                e
            })?;
        debug!(group = %group, count = nodes.len(), "Got node list locally");
        self.nodes
            .extend(nodes.into_iter().map(|p| p.full_path().to_string()));
        Ok(())
    }

    fn merge_remote(&self, node: &Node, response: DataResponse) -> Result<()> {
        match response {
            DataResponse::Paths(paths) => {
                self.nodes.extend(paths);
                Ok(())
            }
            other => Err(unexpected_response(self.method(), node, &other)),
        }
    }

    fn remote_exhausted(&self, group: &PartitionGroup, request: &DataRequest) {
        error!(group = %group, ?request, "Fail to get node list");
    }

    fn finish(&self) -> Result<Vec<PartialPath>> {
        Ok(self
            .nodes
            .snapshot()
            .iter()
            .map(|p| PartialPath::new(p))
            .collect::<tessera_core::Result<Vec<_>>>()?)
    }
}

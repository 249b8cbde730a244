use super::{unexpected_request, unexpected_response, Aggregator, CountAccumulator};
use crate::context::ClusterContext;
use crate::error::Result;
use crate::partition::{Node, PartitionGroup};
use crate::router::PathRouter;
use crate::transport::{DataRequest, DataResponse};
use std::collections::BTreeMap;
use tessera_core::PartialPath;
use tracing::{debug, warn};

/// Batch device-count patterns per owning group.
///
/// Each storage group is asked with the query rewritten to start with that
/// storage group, so a storage group deeper than the query is only counted
/// for the part of the pattern that reaches below it.
pub fn device_count_work(
    router: &PathRouter,
    sg_paths: &BTreeMap<PartialPath, Vec<PartialPath>>,
) -> Result<Vec<(PartitionGroup, DataRequest)>> {
    Ok(router
        .group_paths(sg_paths)?
        .into_iter()
        .map(|(group, paths)| (group, DataRequest::DeviceCount { paths }))
        .collect())
}

/// Sums device counts
#[derive(Debug, Default)]
pub struct DeviceCountAggregator {
    total: CountAccumulator,
}

impl DeviceCountAggregator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregator for DeviceCountAggregator {
    type Output = usize;

    fn method(&self) -> &'static str {
        "getDeviceCount"
    }

    fn answer_locally(&self, ctx: &ClusterContext, group: &PartitionGroup, request: &DataRequest) -> Result<()> {
        let DataRequest::DeviceCount { paths } = request else {
            return Err(unexpected_request(self.method(), request));
        };
        let mut count = 0;
        for path in paths {
            count += ctx.metadata().get_devices_num(&PartialPath::new(path)?)?;
        }
        debug!(group = %group, count, "Got device count locally");
        self.total.add(count);
        Ok(())
    }

    fn merge_remote(&self, node: &Node, response: DataResponse) -> Result<()> {
        match response {
            DataResponse::Count(count) => {
                debug!(node = %node, count, "Got remote device count");
                self.total.add(count);
                Ok(())
            }
            other => Err(unexpected_response(self.method(), node, &other)),
        }
    }

    fn remote_exhausted(&self, group: &PartitionGroup, request: &DataRequest) {
        warn!(group = %group, ?request, "Cannot get devices from any replica");
    }

    fn finish(&self) -> Result<usize> {
        Ok(self.total.get())
    }
}

use super::{unexpected_request, unexpected_response, Aggregator, CountAccumulator};
use crate::context::ClusterContext;
use crate::error::Result;
use crate::partition::{Node, PartitionGroup};
use crate::transport::{DataRequest, DataResponse};
use std::collections::{BTreeMap, BTreeSet};
use tessera_core::PartialPath;
use tracing::{debug, warn};

/// Resolve the storage groups that answer a level-bounded count on their own.
///
/// Returns `None` when the pattern cannot have nodes at `level`. Otherwise
/// returns the distinct level nodes contributed by storage groups at least
/// `level` deep; those storage groups are removed from `sg_paths` so only the
/// shallower ones are counted through the schema.
pub fn split_by_level(
    path: &PartialPath,
    level: usize,
    sg_paths: &mut BTreeMap<PartialPath, Vec<PartialPath>>,
) -> Option<BTreeSet<PartialPath>> {
    if !path.may_have_nodes_at_level(level) {
        return None;
    }

    let mut matched = BTreeSet::new();
    sg_paths.retain(|sg, _| {
        if sg.node_length() > level {
            if let Some(node) = sg.prefix(level + 1) {
                matched.insert(node);
            }
            false
        } else {
            true
        }
    });
    Some(matched)
}

/// Sums timeseries counts (`level == -1`) or level node counts
#[derive(Debug)]
pub struct PathCountAggregator {
    level: i32,
    total: CountAccumulator,
}

impl PathCountAggregator {
    pub fn new(level: i32) -> Self {
        Self {
            level,
            total: CountAccumulator::default(),
        }
    }

    fn count_local(&self, ctx: &ClusterContext, path: &PartialPath) -> Result<usize> {
        if self.level < 0 {
            ctx.metadata().get_all_timeseries_count(path)
        } else {
            ctx.metadata()
                .get_nodes_count_in_given_level(path, self.level as usize)
        }
    }
}

impl Aggregator for PathCountAggregator {
    type Output = usize;

    fn method(&self) -> &'static str {
        "getPathCount"
    }

    fn answer_locally(&self, ctx: &ClusterContext, group: &PartitionGroup, request: &DataRequest) -> Result<()> {
        let DataRequest::PathCount { paths, .. } = request else {
            return Err(unexpected_request(self.method(), request));
        };
        let mut count = 0;
        for path in paths {
            count += self.count_local(ctx, &PartialPath::new(path)?)?;
        }
        debug!(group = %group, level = self.level, count, "Got path count locally");
        self.total.add(count);
        Ok(())
    }

    fn merge_remote(&self, node: &Node, response: DataResponse) -> Result<()> {
        match response {
            DataResponse::Count(count) => {
                debug!(node = %node, level = self.level, count, "Got remote path count");
                self.total.add(count);
                Ok(())
            }
            other => Err(unexpected_response(self.method(), node, &other)),
        }
    }

    fn remote_exhausted(&self, group: &PartitionGroup, request: &DataRequest) {
        warn!(group = %group, ?request, "Cannot get path count from any replica");
    }

    fn finish(&self) -> Result<usize> {
        Ok(self.total.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> PartialPath {
        PartialPath::new(s).unwrap()
    }

    fn sg_map(sgs: &[&str]) -> BTreeMap<PartialPath, Vec<PartialPath>> {
        sgs.iter()
            .map(|sg| (path(sg), vec![path(&format!("{}.**", sg))]))
            .collect()
    }

    #[test]
    fn test_single_wildcard_requires_its_level() {
        let mut map = sg_map(&["root.sg"]);
        assert!(split_by_level(&path("root.sg.d1.*"), 2, &mut map).is_none());
        assert!(split_by_level(&path("root.sg.d1.*"), 3, &mut map).is_some());
    }

    #[test]
    fn test_level_above_fixed_prefix_is_zero() {
        let mut map = sg_map(&["root.sg"]);
        assert!(split_by_level(&path("root.sg.d1.**"), 1, &mut map).is_none());
        assert!(split_by_level(&path("root.sg.d1.**"), 2, &mut map).is_some());
    }

    #[test]
    fn test_deep_storage_groups_short_circuit() {
        let mut map = sg_map(&["root.ln.wf01", "root.ln.wf02", "root.sg"]);
        let matched = split_by_level(&path("root.**"), 1, &mut map).unwrap();

        assert_eq!(matched.into_iter().collect::<Vec<_>>(), vec![path("root.ln"), path("root.sg")]);
        assert!(map.is_empty());

        let mut map = sg_map(&["root.ln.wf01", "root.sg"]);
        let matched = split_by_level(&path("root.**"), 2, &mut map).unwrap();
        assert_eq!(matched.into_iter().collect::<Vec<_>>(), vec![path("root.ln.wf01")]);
        assert_eq!(map.keys().cloned().collect::<Vec<_>>(), vec![path("root.sg")]);
    }
}

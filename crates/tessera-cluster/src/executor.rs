//! Cluster-wide metadata queries
//!
//! Entry points resolve the storage groups a pattern touches, batch the work
//! per owning data group and merge local and remote answers through the
//! aggregators. Failure policy differs per operation:
//!
//! - counts and node lists fail when the metadata leader cannot be reached
//! - child listings and storage group listings answer from local state when
//!   the metadata leader cannot be reached
//! - a remote group no replica answers for contributes nothing

use crate::aggregate::{
    self, device_count_work, split_by_level, ChildrenAggregator, ChildrenKind, DeviceCountAggregator,
    NodeListAggregator, PathCountAggregator,
};
use crate::context::ClusterContext;
use crate::error::{ClusterError, Result};
use crate::fanout::PoolSize;
use crate::transport::DataRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tessera_core::{CoreError, PartialPath, MULTI_LEVEL_PATH_WILDCARD};
use tracing::debug;

/// Metadata show/count statements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShowQuery {
    CountDevices { path: PartialPath, prefix_match: bool },
    CountTimeseries { path: PartialPath, prefix_match: bool },
    CountNodes { path: PartialPath, level: usize, prefix_match: bool },
    ChildNodes { path: PartialPath },
    ChildPaths { path: PartialPath },
    StorageGroups,
}

/// Result of a show statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShowResult {
    Count(usize),
    Paths(Vec<String>),
    Names(Vec<String>),
}

/// Executes metadata queries across the cluster
#[derive(Clone)]
pub struct ClusterMetadataExecutor {
    ctx: ClusterContext,
}

impl ClusterMetadataExecutor {
    pub fn new(ctx: ClusterContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ClusterContext {
        &self.ctx
    }

    /// Number of devices matching `path`, or under it with `prefix_match`.
    ///
    /// Fails with `PathNotFound` when no storage group is touched at all.
    pub fn devices_num(&self, path: &PartialPath, prefix_match: bool) -> Result<usize> {
        // make sure this node knows all storage groups
        self.ctx.gate().sync_meta()?;

        let mut patterns = vec![path.clone()];
        if prefix_match {
            patterns.push(path.concat_node(MULTI_LEVEL_PATH_WILDCARD));
        }

        let mut count = 0;
        let mut resolved = false;
        for pattern in &patterns {
            let sg_paths = self.ctx.metadata().group_path_by_storage_group(pattern)?;
            if sg_paths.is_empty() {
                continue;
            }
            resolved = true;
            debug!(%pattern, storage_groups = ?sg_paths.keys().collect::<Vec<_>>(), "Resolved storage groups");

            let work = device_count_work(self.ctx.router(), &sg_paths)?;
            count += aggregate::run(&self.ctx, DeviceCountAggregator::new(), work, PoolSize::PerGroup)?;
        }
        if !resolved {
            return Err(ClusterError::PathNotFound(path.full_path().to_string()));
        }
        debug!(%path, prefix_match, count, "Counted devices");
        Ok(count)
    }

    /// Number of timeseries matching `path`
    pub fn paths_num(&self, path: &PartialPath, prefix_match: bool) -> Result<usize> {
        self.nodes_num_in_given_level(path, -1, prefix_match)
    }

    /// Number of nodes at `level` under `path`; `-1` counts timeseries
    pub fn nodes_num_in_given_level(&self, path: &PartialPath, level: i32, prefix_match: bool) -> Result<usize> {
        let mut count = self.nodes_num_exact(path, level)?;
        if prefix_match {
            count += self.nodes_num_exact(&path.concat_node(MULTI_LEVEL_PATH_WILDCARD), level)?;
        }
        Ok(count)
    }

    fn nodes_num_exact(&self, path: &PartialPath, level: i32) -> Result<usize> {
        if level < -1 {
            return Err(CoreError::InvalidLevel {
                path: path.full_path().to_string(),
                level,
            }
            .into());
        }
        self.ctx.gate().sync_meta()?;

        // Storage groups below `path` must be found too, so resolve with a
        // trailing `**`.
        let wildcard_path = if path.measurement() == MULTI_LEVEL_PATH_WILDCARD {
            path.clone()
        } else {
            path.concat_node(MULTI_LEVEL_PATH_WILDCARD)
        };
        let mut sg_paths = self.ctx.metadata().group_path_by_storage_group(&wildcard_path)?;
        if sg_paths.is_empty() {
            return Ok(0);
        }
        debug!(%path, storage_groups = ?sg_paths.keys().collect::<Vec<_>>(), "Resolved storage groups");

        let mut count = 0;
        if level >= 0 {
            match split_by_level(path, level as usize, &mut sg_paths) {
                Some(matched) => count += matched.len(),
                None => return Ok(0),
            }
        } else {
            // timeseries are counted against the pattern itself
            for (sg, paths) in sg_paths.iter_mut() {
                *paths = path.alter_prefix_path(sg);
            }
            sg_paths.retain(|_, paths| !paths.is_empty());
        }

        let work = self
            .ctx
            .router()
            .group_paths(&sg_paths)?
            .into_iter()
            .map(|(group, paths)| (group, DataRequest::PathCount { paths, level }))
            .collect();
        count += aggregate::run(&self.ctx, PathCountAggregator::new(level), work, PoolSize::PerGroup)?;
        debug!(%path, level, count, "Counted paths");
        Ok(count)
    }

    /// Distinct nodes at `level` matching `path`, across every group
    pub fn nodes_list(&self, path: &PartialPath, level: i32) -> Result<Vec<PartialPath>> {
        self.ctx.gate().sync_meta()?;

        let request = DataRequest::NodeList {
            path: path.full_path().to_string(),
            level,
        };
        let work = self
            .ctx
            .router()
            .global_groups()
            .into_iter()
            .map(|group| (group, request.clone()))
            .collect();
        aggregate::run(&self.ctx, NodeListAggregator::new(), work, self.broadcast_pool())
    }

    /// Names of the children of `path`
    pub fn node_next_children(&self, path: &PartialPath) -> Result<BTreeSet<String>> {
        self.next_children(path, ChildrenKind::Names)
    }

    /// Full paths of the children of `path`
    pub fn path_next_children(&self, path: &PartialPath) -> Result<BTreeSet<String>> {
        self.next_children(path, ChildrenKind::Paths)
    }

    fn next_children(&self, path: &PartialPath, kind: ChildrenKind) -> Result<BTreeSet<String>> {
        self.ctx.gate().sync_meta_best_effort();

        let aggregator = ChildrenAggregator::new(kind);
        let request = aggregator.request(path);
        let work = self
            .ctx
            .router()
            .global_groups()
            .into_iter()
            .map(|group| (group, request.clone()))
            .collect();
        aggregate::run(&self.ctx, aggregator, work, self.broadcast_pool())
    }

    /// Every storage group known after a best-effort sync
    pub fn all_storage_groups(&self) -> Result<Vec<PartialPath>> {
        self.ctx.gate().sync_meta_best_effort();
        self.ctx.metadata().all_storage_groups()
    }

    /// Execute a show statement
    pub fn process_show(&self, query: &ShowQuery) -> Result<ShowResult> {
        self.ctx
            .gate()
            .sync_meta()
            .map_err(|e| ClusterError::QueryProcess(e.to_string()))?;

        let result = match query {
            ShowQuery::CountDevices { path, prefix_match } => ShowResult::Count(self.devices_num(path, *prefix_match)?),
            ShowQuery::CountTimeseries { path, prefix_match } => {
                ShowResult::Count(self.paths_num(path, *prefix_match)?)
            }
            ShowQuery::CountNodes {
                path,
                level,
                prefix_match,
            } => ShowResult::Count(self.nodes_num_in_given_level(path, *level as i32, *prefix_match)?),
            ShowQuery::ChildNodes { path } => ShowResult::Names(self.node_next_children(path)?.into_iter().collect()),
            ShowQuery::ChildPaths { path } => ShowResult::Paths(self.path_next_children(path)?.into_iter().collect()),
            ShowQuery::StorageGroups => ShowResult::Paths(
                self.all_storage_groups()?
                    .into_iter()
                    .map(String::from)
                    .collect(),
            ),
        };
        Ok(result)
    }

    fn broadcast_pool(&self) -> PoolSize {
        PoolSize::Fixed(self.ctx.config().broadcast_pool_size)
    }
}

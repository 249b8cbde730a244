//! Local schema access
//!
//! `LocalMetadataStore` is the narrow view of the local schema engine the
//! executor needs. `MemorySchemaStore` is an in-process implementation used
//! by standalone deployments and tests.

use crate::error::{ClusterError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use tessera_core::{PartialPath, MULTI_LEVEL_PATH_WILDCARD};

/// Restricts which storage groups a local listing may report
pub trait StorageGroupFilter: Send + Sync {
    fn satisfy(&self, storage_group: &str) -> bool;
}

/// Accepts every storage group
#[derive(Debug, Default, Clone, Copy)]
pub struct AllStorageGroups;

impl StorageGroupFilter for AllStorageGroups {
    fn satisfy(&self, _storage_group: &str) -> bool {
        true
    }
}

/// Schema operations answered from the local replica
pub trait LocalMetadataStore: Send + Sync {
    /// Storage groups `path` may touch, each mapped to the pattern rewritten
    /// to start with that storage group
    fn group_path_by_storage_group(&self, path: &PartialPath) -> Result<BTreeMap<PartialPath, Vec<PartialPath>>>;

    /// Every storage group known locally
    fn all_storage_groups(&self) -> Result<Vec<PartialPath>>;

    fn get_devices_num(&self, path: &PartialPath) -> Result<usize>;

    fn get_all_timeseries_count(&self, path: &PartialPath) -> Result<usize>;

    fn get_nodes_count_in_given_level(&self, path: &PartialPath, level: usize) -> Result<usize>;

    fn get_nodes_list_in_given_level(
        &self,
        path: &PartialPath,
        level: usize,
        filter: &dyn StorageGroupFilter,
    ) -> Result<Vec<PartialPath>>;

    fn get_child_node_name_in_next_level(&self, path: &PartialPath) -> Result<BTreeSet<String>>;

    fn get_child_node_path_in_next_level(&self, path: &PartialPath) -> Result<BTreeSet<String>>;
}

#[derive(Debug, Default)]
struct Schema {
    storage_groups: BTreeSet<PartialPath>,
    /// timeseries -> owning storage group
    timeseries: BTreeMap<PartialPath, PartialPath>,
}

impl Schema {
    fn storage_group_of(&self, path: &PartialPath) -> Option<&PartialPath> {
        self.storage_groups.iter().find(|sg| sg.is_prefix_of(path))
    }

    fn known_paths(&self) -> impl Iterator<Item = &PartialPath> {
        self.storage_groups.iter().chain(self.timeseries.keys())
    }
}

/// In-memory schema tree
#[derive(Debug, Default)]
pub struct MemorySchemaStore {
    schema: RwLock<Schema>,
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a storage group; storage groups never nest
    pub fn set_storage_group(&self, path: &PartialPath) -> Result<()> {
        if path.has_wildcard() {
            return Err(ClusterError::Metadata(format!(
                "storage group {} contains a wildcard",
                path
            )));
        }
        let mut schema = self.schema.write();
        if let Some(existing) = schema
            .storage_groups
            .iter()
            .find(|sg| sg.is_prefix_of(path) || path.is_prefix_of(sg))
        {
            return Err(ClusterError::Metadata(format!(
                "{} overlaps storage group {}",
                path, existing
            )));
        }
        schema.storage_groups.insert(path.clone());
        Ok(())
    }

    /// Register a timeseries under an existing storage group
    pub fn create_timeseries(&self, path: &PartialPath) -> Result<()> {
        if path.has_wildcard() {
            return Err(ClusterError::Metadata(format!(
                "timeseries {} contains a wildcard",
                path
            )));
        }
        let mut schema = self.schema.write();
        let sg = schema
            .storage_group_of(path)
            .filter(|sg| sg.node_length() < path.node_length())
            .cloned()
            .ok_or_else(|| ClusterError::Metadata(format!("Storage group is not set for {}", path)))?;
        schema.timeseries.insert(path.clone(), sg);
        Ok(())
    }

    fn level_nodes<'a, I>(paths: I, level: usize) -> BTreeSet<PartialPath>
    where
        I: Iterator<Item = &'a PartialPath>,
    {
        paths.filter_map(|p| p.prefix(level + 1)).collect()
    }
}

impl LocalMetadataStore for MemorySchemaStore {
    fn group_path_by_storage_group(&self, path: &PartialPath) -> Result<BTreeMap<PartialPath, Vec<PartialPath>>> {
        let schema = self.schema.read();
        Ok(schema
            .storage_groups
            .iter()
            .filter_map(|sg| {
                let altered = path.alter_prefix_path(sg);
                (!altered.is_empty()).then(|| (sg.clone(), altered))
            })
            .collect())
    }

    fn all_storage_groups(&self) -> Result<Vec<PartialPath>> {
        Ok(self.schema.read().storage_groups.iter().cloned().collect())
    }

    fn get_devices_num(&self, path: &PartialPath) -> Result<usize> {
        let schema = self.schema.read();
        let devices: BTreeSet<PartialPath> = schema
            .timeseries
            .keys()
            .filter_map(|ts| ts.device())
            .filter(|device| path.matches(device))
            .collect();
        Ok(devices.len())
    }

    fn get_all_timeseries_count(&self, path: &PartialPath) -> Result<usize> {
        let schema = self.schema.read();
        Ok(schema.timeseries.keys().filter(|ts| path.matches(ts)).count())
    }

    fn get_nodes_count_in_given_level(&self, path: &PartialPath, level: usize) -> Result<usize> {
        Ok(self
            .get_nodes_list_in_given_level(path, level, &AllStorageGroups)?
            .len())
    }

    fn get_nodes_list_in_given_level(
        &self,
        path: &PartialPath,
        level: usize,
        filter: &dyn StorageGroupFilter,
    ) -> Result<Vec<PartialPath>> {
        if !path.may_have_nodes_at_level(level) {
            return Ok(Vec::new());
        }
        // level nodes are looked up under the pattern, as counting does
        let scope = if path.measurement() == MULTI_LEVEL_PATH_WILDCARD {
            path.clone()
        } else {
            path.concat_node(MULTI_LEVEL_PATH_WILDCARD)
        };

        let schema = self.schema.read();
        let groups = schema
            .storage_groups
            .iter()
            .filter(|sg| filter.satisfy(sg.full_path()))
            .filter(|sg| !scope.alter_prefix_path(sg).is_empty());
        let series = schema
            .timeseries
            .iter()
            .filter(|(ts, sg)| filter.satisfy(sg.full_path()) && scope.matches(ts))
            .map(|(ts, _)| ts);

        let mut nodes = Self::level_nodes(groups, level);
        nodes.extend(Self::level_nodes(series, level));
        Ok(nodes.into_iter().collect())
    }

    fn get_child_node_name_in_next_level(&self, path: &PartialPath) -> Result<BTreeSet<String>> {
        let depth = path.node_length();
        let schema = self.schema.read();
        Ok(schema
            .known_paths()
            .filter_map(|p| p.prefix(depth + 1))
            .filter(|child| child.prefix(depth).is_some_and(|parent| path.matches(&parent)))
            .map(|child| child.measurement().to_string())
            .collect())
    }

    fn get_child_node_path_in_next_level(&self, path: &PartialPath) -> Result<BTreeSet<String>> {
        let depth = path.node_length();
        let schema = self.schema.read();
        Ok(schema
            .known_paths()
            .filter_map(|p| p.prefix(depth + 1))
            .filter(|child| child.prefix(depth).is_some_and(|parent| path.matches(&parent)))
            .map(|child| child.full_path().to_string())
            .collect())
    }
}

//! Storage group routing
//!
//! Storage groups are hashed onto a fixed ring of slots and every data group
//! owns a contiguous range of slots. `PathRouter` turns a storage group ->
//! paths mapping into one batched work item per owning group.

use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::metadata::StorageGroupFilter;
use crate::partition::{PartitionGroup, RaftNode};
use fxhash::FxHasher;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tessera_core::PartialPath;

/// Compute the slot a storage group hashes to
pub fn slot_of(storage_group: &str, slot_count: u32) -> u32 {
    let mut hasher = FxHasher::default();
    storage_group.hash(&mut hasher);
    (hasher.finish() % slot_count.max(1) as u64) as u32
}

/// Maps storage groups to the data group that owns them
pub trait PartitionTable: Send + Sync {
    /// The single group owning `storage_group`
    fn route(&self, storage_group: &PartialPath) -> Result<PartitionGroup>;

    /// Every data group in the cluster, in table order
    fn global_groups(&self) -> Vec<PartitionGroup>;

    /// Filter accepting the storage groups owned by the group with this header
    fn storage_group_filter(&self, header: &RaftNode) -> Box<dyn StorageGroupFilter>;
}

#[derive(Debug)]
struct SlotAssignment {
    groups: Vec<PartitionGroup>,
    /// Group index per slot
    owners: Vec<usize>,
}

impl SlotAssignment {
    fn build(groups: Vec<PartitionGroup>, slot_count: u32) -> Result<Self> {
        if groups.is_empty() {
            return Err(ClusterError::PartitionTable(
                "no data groups to assign slots to".to_string(),
            ));
        }
        let n = groups.len();
        let owners = (0..slot_count as usize)
            .map(|slot| slot * n / slot_count as usize)
            .collect();
        Ok(Self { groups, owners })
    }
}

/// Slot-based partition table
pub struct SlotPartitionTable {
    slot_count: u32,
    assignment: RwLock<SlotAssignment>,
}

impl SlotPartitionTable {
    /// Create a table assigning contiguous slot ranges to `groups`
    pub fn new(groups: Vec<PartitionGroup>, slot_count: u32) -> Result<Self> {
        if slot_count == 0 {
            return Err(ClusterError::PartitionTable(
                "slot_count must be positive".to_string(),
            ));
        }
        Ok(Self {
            slot_count,
            assignment: RwLock::new(SlotAssignment::build(groups, slot_count)?),
        })
    }

    /// Create the table from cluster configuration
    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        Self::new(config.partition_groups()?, config.slot_count)
    }

    /// Replace the committed group assignment
    pub fn update_groups(&self, groups: Vec<PartitionGroup>) -> Result<()> {
        let assignment = SlotAssignment::build(groups, self.slot_count)?;
        *self.assignment.write() = assignment;
        Ok(())
    }

    /// Slots owned by the group with this header
    pub fn node_slots(&self, header: &RaftNode) -> Vec<u32> {
        let assignment = self.assignment.read();
        let Some(idx) = assignment.groups.iter().position(|g| &g.header() == header) else {
            return Vec::new();
        };
        assignment
            .owners
            .iter()
            .enumerate()
            .filter(|(_, &owner)| owner == idx)
            .map(|(slot, _)| slot as u32)
            .collect()
    }

    /// Total number of slots
    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }
}

impl PartitionTable for SlotPartitionTable {
    fn route(&self, storage_group: &PartialPath) -> Result<PartitionGroup> {
        let slot = slot_of(storage_group.full_path(), self.slot_count);
        let assignment = self.assignment.read();
        assignment
            .owners
            .get(slot as usize)
            .and_then(|&idx| assignment.groups.get(idx))
            .cloned()
            .ok_or_else(|| {
                ClusterError::PartitionTable(format!(
                    "slot {} of {} has no owner",
                    slot, storage_group
                ))
            })
    }

    fn global_groups(&self) -> Vec<PartitionGroup> {
        self.assignment.read().groups.clone()
    }

    fn storage_group_filter(&self, header: &RaftNode) -> Box<dyn StorageGroupFilter> {
        Box::new(SlotStorageGroupFilter::new(self.node_slots(header), self.slot_count))
    }
}

/// Accepts only storage groups hashing into a given slot set
#[derive(Debug, Clone)]
pub struct SlotStorageGroupFilter {
    slots: HashSet<u32>,
    slot_count: u32,
}

impl SlotStorageGroupFilter {
    pub fn new(slots: impl IntoIterator<Item = u32>, slot_count: u32) -> Self {
        Self {
            slots: slots.into_iter().collect(),
            slot_count,
        }
    }
}

impl StorageGroupFilter for SlotStorageGroupFilter {
    fn satisfy(&self, storage_group: &str) -> bool {
        self.slots.contains(&slot_of(storage_group, self.slot_count))
    }
}

/// Resolves storage groups to their owning data groups
#[derive(Clone)]
pub struct PathRouter {
    table: Arc<dyn PartitionTable>,
}

impl PathRouter {
    pub fn new(table: Arc<dyn PartitionTable>) -> Self {
        Self { table }
    }

    /// The group owning `storage_group`
    pub fn route(&self, storage_group: &PartialPath) -> Result<PartitionGroup> {
        self.table.route(storage_group)
    }

    /// Every data group in the cluster
    pub fn global_groups(&self) -> Vec<PartitionGroup> {
        self.table.global_groups()
    }

    /// Filter accepting the storage groups the group headed by `header` owns
    pub fn group_filter(&self, header: &RaftNode) -> Box<dyn StorageGroupFilter> {
        self.table.storage_group_filter(header)
    }

    /// Batch query paths by owning group.
    ///
    /// Groups appear in the order their first storage group is seen, so
    /// callers get one work item per group regardless of how many storage
    /// groups it owns.
    pub fn group_paths<'a, I>(&self, by_storage_group: I) -> Result<Vec<(PartitionGroup, Vec<String>)>>
    where
        I: IntoIterator<Item = (&'a PartialPath, &'a Vec<PartialPath>)>,
    {
        let mut batches: Vec<(PartitionGroup, Vec<String>)> = Vec::new();
        for (storage_group, paths) in by_storage_group {
            let group = self.route(storage_group)?;
            let batch = match batches.iter_mut().position(|(g, _)| *g == group) {
                Some(idx) => &mut batches[idx].1,
                None => {
                    batches.push((group, Vec::new()));
                    let last = batches.len() - 1;
                    &mut batches[last].1
                }
            };
            batch.extend(paths.iter().map(|p| p.full_path().to_string()));
        }
        Ok(batches)
    }

    /// The underlying partition table
    pub fn table(&self) -> &Arc<dyn PartitionTable> {
        &self.table
    }
}

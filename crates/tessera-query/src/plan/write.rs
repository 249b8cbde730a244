//! Insert plan nodes

use crate::analysis::MeasurementSchema;
use crate::id::PlanNodeId;
use crate::statement::{DataType, Value};
use std::collections::BTreeMap;
use std::fmt;
use tessera_core::PartialPath;

/// Data region a row is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataRegionId(pub u32);

impl fmt::Display for DataRegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataRegion[{}]", self.0)
    }
}

/// Maps a device and timestamp to the data region that stores it
pub trait DataRegionResolver {
    fn region_of(&self, device: &PartialPath, time: i64) -> DataRegionId;
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertRowNode {
    pub id: PlanNodeId,
    pub device_path: PartialPath,
    pub aligned: bool,
    pub schemas: Vec<MeasurementSchema>,
    pub data_types: Vec<DataType>,
    pub time: i64,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertTabletNode {
    pub id: PlanNodeId,
    pub device_path: PartialPath,
    pub aligned: bool,
    pub schemas: Vec<MeasurementSchema>,
    pub data_types: Vec<DataType>,
    pub times: Vec<i64>,
    pub columns: Vec<Vec<Option<Value>>>,
    pub row_count: usize,
}

/// A batch of rows, each remembering its position in the original statement
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRowsNode {
    pub id: PlanNodeId,
    pub rows: Vec<InsertRowNode>,
    pub row_indexes: Vec<usize>,
}

impl InsertRowsNode {
    pub fn new(id: PlanNodeId) -> Self {
        Self {
            id,
            rows: Vec::new(),
            row_indexes: Vec::new(),
        }
    }

    pub fn add_one_insert_row_node(&mut self, row: InsertRowNode, index: usize) {
        self.rows.push(row);
        self.row_indexes.push(index);
    }

    /// Regroup rows by the data region they are written to.
    ///
    /// Each region's batch keeps this node's id and the original row indexes,
    /// in their original relative order. Regions are returned in id order.
    pub fn split_by_partition(&self, resolver: &dyn DataRegionResolver) -> Vec<(DataRegionId, InsertRowsNode)> {
        let mut by_region: BTreeMap<DataRegionId, InsertRowsNode> = BTreeMap::new();
        for (row, &index) in self.rows.iter().zip(&self.row_indexes) {
            let region = resolver.region_of(&row.device_path, row.time);
            by_region
                .entry(region)
                .or_insert_with(|| InsertRowsNode::new(self.id.clone()))
                .add_one_insert_row_node(row.clone(), index);
        }
        by_region.into_iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertMultiTabletsNode {
    pub id: PlanNodeId,
    pub tablets: Vec<InsertTabletNode>,
}

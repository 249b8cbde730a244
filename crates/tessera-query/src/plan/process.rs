//! Read-path plan nodes

use super::PlanNode;
use crate::id::PlanNodeId;
use crate::statement::{FillPolicy, FilterNullPolicy, OrderBy, QueryFilter};
use tessera_core::PartialPath;

/// Scan of one timeseries
#[derive(Debug, Clone, PartialEq)]
pub struct SourceNode {
    pub id: PlanNodeId,
    pub path: PartialPath,
    pub order: OrderBy,
    /// Predicate evaluated while scanning
    pub predicate: Option<QueryFilter>,
}

impl SourceNode {
    pub fn new(id: PlanNodeId, path: PartialPath, order: OrderBy) -> Self {
        Self {
            id,
            path,
            order,
            predicate: None,
        }
    }

    pub fn device_name(&self) -> String {
        self.path.device_name()
    }
}

/// Aligns child columns on time
#[derive(Debug, Clone, PartialEq)]
pub struct TimeJoinNode {
    pub id: PlanNodeId,
    pub order: OrderBy,
    pub children: Vec<PlanNode>,
}

/// Emits each device's columns as a separate row block, tagged with the device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMergeNode {
    pub id: PlanNodeId,
    pub order: OrderBy,
    pub devices: Vec<String>,
    pub children: Vec<PlanNode>,
}

impl DeviceMergeNode {
    pub fn new(id: PlanNodeId, order: OrderBy) -> Self {
        Self {
            id,
            order,
            devices: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn add_child_device_node(&mut self, device: impl Into<String>, child: PlanNode) {
        self.devices.push(device.into());
        self.children.push(child);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub id: PlanNodeId,
    pub child: Box<PlanNode>,
    pub predicate: QueryFilter,
}

/// Rolls up columns into level buckets.
///
/// Two columns share a bucket when their paths are equal after every device
/// node outside `levels` is masked with `*`. Output columns follow the
/// insertion order of the grouped path map. The node annotates the stream
/// below it and reports that stream's children as its own.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupByLevelNode {
    pub id: PlanNodeId,
    pub child: Box<PlanNode>,
    pub levels: Vec<usize>,
    pub grouped_path_map: Vec<(String, String)>,
    pub column_names: Vec<String>,
}

impl GroupByLevelNode {
    pub fn new(
        id: PlanNodeId,
        child: PlanNode,
        levels: Vec<usize>,
        grouped_path_map: Vec<(String, String)>,
    ) -> Self {
        let mut column_names: Vec<String> = Vec::new();
        for (_, bucket) in &grouped_path_map {
            if !column_names.contains(bucket) {
                column_names.push(bucket.clone());
            }
        }
        Self {
            id,
            child: Box::new(child),
            levels,
            grouped_path_map,
            column_names,
        }
    }

    /// Bucket `column` rolls up into
    pub fn bucket_of(&self, column: &str) -> Option<&str> {
        self.grouped_path_map
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, bucket)| bucket.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillNode {
    pub id: PlanNodeId,
    pub child: Box<PlanNode>,
    pub policy: FillPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterNullNode {
    pub id: PlanNodeId,
    pub child: Box<PlanNode>,
    pub policy: FilterNullPolicy,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortNode {
    pub id: PlanNodeId,
    pub child: Box<PlanNode>,
    pub order: OrderBy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitNode {
    pub id: PlanNodeId,
    pub child: Box<PlanNode>,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OffsetNode {
    pub id: PlanNodeId,
    pub child: Box<PlanNode>,
    pub offset: usize,
}

//! Logical plan tree
//!
//! `PlanNode` is a closed set of node kinds. Every node carries a plan node
//! id unique within its query; tree walks are plain pattern matches.

pub mod process;
pub mod schema;
pub mod write;

pub use process::{
    DeviceMergeNode, FillNode, FilterNode, FilterNullNode, GroupByLevelNode, LimitNode, OffsetNode, SortNode,
    SourceNode, TimeJoinNode,
};
pub use schema::{AlterTimeSeriesNode, AuthorNode, CreateAlignedTimeSeriesNode, CreateTimeSeriesNode, Privilege};
pub use write::{
    DataRegionId, DataRegionResolver, InsertMultiTabletsNode, InsertRowNode, InsertRowsNode, InsertTabletNode,
};

use crate::error::Result;
use crate::id::PlanNodeId;
use serde::Serialize;
use tessera_core::PartialPath;

/// Column holding the device name in device-aligned output
pub const DEVICE_COLUMN: &str = "Device";

#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    Source(SourceNode),
    TimeJoin(TimeJoinNode),
    DeviceMerge(DeviceMergeNode),
    Filter(FilterNode),
    GroupByLevel(GroupByLevelNode),
    Fill(FillNode),
    FilterNull(FilterNullNode),
    Sort(SortNode),
    Limit(LimitNode),
    Offset(OffsetNode),
    InsertRow(InsertRowNode),
    InsertTablet(InsertTabletNode),
    InsertRows(InsertRowsNode),
    InsertMultiTablets(InsertMultiTabletsNode),
    CreateTimeSeries(CreateTimeSeriesNode),
    CreateAlignedTimeSeries(CreateAlignedTimeSeriesNode),
    AlterTimeSeries(AlterTimeSeriesNode),
    Author(AuthorNode),
}

impl PlanNode {
    pub fn id(&self) -> &PlanNodeId {
        match self {
            PlanNode::Source(n) => &n.id,
            PlanNode::TimeJoin(n) => &n.id,
            PlanNode::DeviceMerge(n) => &n.id,
            PlanNode::Filter(n) => &n.id,
            PlanNode::GroupByLevel(n) => &n.id,
            PlanNode::Fill(n) => &n.id,
            PlanNode::FilterNull(n) => &n.id,
            PlanNode::Sort(n) => &n.id,
            PlanNode::Limit(n) => &n.id,
            PlanNode::Offset(n) => &n.id,
            PlanNode::InsertRow(n) => &n.id,
            PlanNode::InsertTablet(n) => &n.id,
            PlanNode::InsertRows(n) => &n.id,
            PlanNode::InsertMultiTablets(n) => &n.id,
            PlanNode::CreateTimeSeries(n) => &n.id,
            PlanNode::CreateAlignedTimeSeries(n) => &n.id,
            PlanNode::AlterTimeSeries(n) => &n.id,
            PlanNode::Author(n) => &n.id,
        }
    }

    /// Node kind as shown in plan output
    pub fn name(&self) -> &'static str {
        match self {
            PlanNode::Source(_) => "SourceNode",
            PlanNode::TimeJoin(_) => "TimeJoinNode",
            PlanNode::DeviceMerge(_) => "DeviceMergeNode",
            PlanNode::Filter(_) => "FilterNode",
            PlanNode::GroupByLevel(_) => "GroupByLevelNode",
            PlanNode::Fill(_) => "FillNode",
            PlanNode::FilterNull(_) => "FilterNullNode",
            PlanNode::Sort(_) => "SortNode",
            PlanNode::Limit(_) => "LimitNode",
            PlanNode::Offset(_) => "OffsetNode",
            PlanNode::InsertRow(_) => "InsertRowNode",
            PlanNode::InsertTablet(_) => "InsertTabletNode",
            PlanNode::InsertRows(_) => "InsertRowsNode",
            PlanNode::InsertMultiTablets(_) => "InsertMultiTabletsNode",
            PlanNode::CreateTimeSeries(_) => "CreateTimeSeriesNode",
            PlanNode::CreateAlignedTimeSeries(_) => "CreateAlignedTimeSeriesNode",
            PlanNode::AlterTimeSeries(_) => "AlterTimeSeriesNode",
            PlanNode::Author(_) => "AuthorNode",
        }
    }

    /// Nodes directly owned by this node
    pub fn inputs(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::TimeJoin(n) => n.children.iter().collect(),
            PlanNode::DeviceMerge(n) => n.children.iter().collect(),
            PlanNode::Filter(n) => vec![n.child.as_ref()],
            PlanNode::GroupByLevel(n) => vec![n.child.as_ref()],
            PlanNode::Fill(n) => vec![n.child.as_ref()],
            PlanNode::FilterNull(n) => vec![n.child.as_ref()],
            PlanNode::Sort(n) => vec![n.child.as_ref()],
            PlanNode::Limit(n) => vec![n.child.as_ref()],
            PlanNode::Offset(n) => vec![n.child.as_ref()],
            _ => Vec::new(),
        }
    }

    /// Logical children. `GroupByLevel` reports its input's children.
    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::GroupByLevel(n) => n.child.children(),
            _ => self.inputs(),
        }
    }

    /// Rebuild this node with every input passed through `f`
    pub fn map_inputs<F>(self, mut f: F) -> Result<PlanNode>
    where
        F: FnMut(PlanNode) -> Result<PlanNode>,
    {
        fn boxed<F: FnMut(PlanNode) -> Result<PlanNode>>(child: Box<PlanNode>, f: &mut F) -> Result<Box<PlanNode>> {
            Ok(Box::new(f(*child)?))
        }

        let node = match self {
            PlanNode::TimeJoin(mut n) => {
                n.children = n.children.into_iter().map(&mut f).collect::<Result<_>>()?;
                PlanNode::TimeJoin(n)
            }
            PlanNode::DeviceMerge(mut n) => {
                n.children = n.children.into_iter().map(&mut f).collect::<Result<_>>()?;
                PlanNode::DeviceMerge(n)
            }
            PlanNode::Filter(mut n) => {
                n.child = boxed(n.child, &mut f)?;
                PlanNode::Filter(n)
            }
            PlanNode::GroupByLevel(mut n) => {
                n.child = boxed(n.child, &mut f)?;
                PlanNode::GroupByLevel(n)
            }
            PlanNode::Fill(mut n) => {
                n.child = boxed(n.child, &mut f)?;
                PlanNode::Fill(n)
            }
            PlanNode::FilterNull(mut n) => {
                n.child = boxed(n.child, &mut f)?;
                PlanNode::FilterNull(n)
            }
            PlanNode::Sort(mut n) => {
                n.child = boxed(n.child, &mut f)?;
                PlanNode::Sort(n)
            }
            PlanNode::Limit(mut n) => {
                n.child = boxed(n.child, &mut f)?;
                PlanNode::Limit(n)
            }
            PlanNode::Offset(mut n) => {
                n.child = boxed(n.child, &mut f)?;
                PlanNode::Offset(n)
            }
            leaf => leaf,
        };
        Ok(node)
    }

    /// Columns this node emits, in order
    pub fn output_column_names(&self) -> Vec<String> {
        match self {
            PlanNode::Source(n) => vec![n.path.full_path().to_string()],
            PlanNode::TimeJoin(n) => n
                .children
                .iter()
                .flat_map(|c| c.output_column_names())
                .collect(),
            PlanNode::DeviceMerge(n) => {
                let mut columns = vec![DEVICE_COLUMN.to_string()];
                for child in &n.children {
                    for column in child.output_column_names() {
                        let measurement = match PartialPath::new(&column) {
                            Ok(path) => path.measurement().to_string(),
                            Err(_) => column,
                        };
                        if !columns.contains(&measurement) {
                            columns.push(measurement);
                        }
                    }
                }
                columns
            }
            PlanNode::GroupByLevel(n) => n.column_names.clone(),
            PlanNode::Filter(_)
            | PlanNode::Fill(_)
            | PlanNode::FilterNull(_)
            | PlanNode::Sort(_)
            | PlanNode::Limit(_)
            | PlanNode::Offset(_) => self
                .inputs()
                .first()
                .map(|c| c.output_column_names())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Title and attribute lines for plan output
    pub fn print(&self) -> (String, Vec<String>) {
        let title = format!("[{} ({})]", self.name(), self.id());
        let attributes = match self {
            PlanNode::Source(n) => {
                let mut attrs = vec![format!("Path: {}", n.path), format!("Order: {:?}", n.order)];
                if let Some(predicate) = &n.predicate {
                    attrs.push(format!("Predicate: {}", predicate));
                }
                attrs
            }
            PlanNode::TimeJoin(n) => vec![format!("Order: {:?}", n.order)],
            PlanNode::DeviceMerge(n) => vec![format!("Devices: {:?}", n.devices)],
            PlanNode::Filter(n) => vec![format!("Predicate: {}", n.predicate)],
            PlanNode::GroupByLevel(n) => vec![
                format!("GroupByLevels: {:?}", n.levels),
                format!("ColumnNames: {:?}", n.column_names),
            ],
            PlanNode::Fill(n) => vec![format!("Policy: {:?}", n.policy)],
            PlanNode::FilterNull(n) => vec![
                format!("Policy: {:?}", n.policy),
                format!("Columns: {:?}", n.columns),
            ],
            PlanNode::Sort(n) => vec![format!("Order: {:?}", n.order)],
            PlanNode::Limit(n) => vec![format!("Count: {}", n.limit)],
            PlanNode::Offset(n) => vec![format!("Count: {}", n.offset)],
            PlanNode::InsertRow(n) => vec![format!("Device: {}", n.device_path), format!("Time: {}", n.time)],
            PlanNode::InsertTablet(n) => vec![
                format!("Device: {}", n.device_path),
                format!("Rows: {}", n.row_count),
            ],
            PlanNode::InsertRows(n) => vec![format!("Rows: {}", n.rows.len())],
            PlanNode::InsertMultiTablets(n) => vec![format!("Tablets: {}", n.tablets.len())],
            PlanNode::CreateTimeSeries(n) => vec![
                format!("Path: {}", n.path),
                format!("DataType: {:?}", n.data_type),
            ],
            PlanNode::CreateAlignedTimeSeries(n) => vec![
                format!("Device: {}", n.device_path),
                format!("Measurements: {:?}", n.measurements),
            ],
            PlanNode::AlterTimeSeries(n) => vec![
                format!("Path: {}", n.path),
                format!("AlterType: {:?}", n.alter_type),
            ],
            PlanNode::Author(n) => vec![format!("AuthorType: {:?}", n.author_type)],
        };
        (title, attributes)
    }

    /// Number of nodes in this subtree
    pub fn node_count(&self) -> usize {
        1 + self.inputs().iter().map(|c| c.node_count()).sum::<usize>()
    }
}

/// One row of plan output
#[derive(Debug, Clone, Serialize)]
pub struct ExplainNode {
    pub depth: usize,
    pub title: String,
    pub attributes: Vec<String>,
}

/// Structured plan output for JSON serialization
#[derive(Debug, Clone, Serialize)]
pub struct ExplainOutput {
    pub query_id: String,
    pub nodes: Vec<ExplainNode>,
}

/// Planned statement with its root node
#[derive(Debug, Clone)]
pub struct LogicalQueryPlan {
    query_id: String,
    root: PlanNode,
}

impl LogicalQueryPlan {
    pub fn new(query_id: impl Into<String>, root: PlanNode) -> Self {
        Self {
            query_id: query_id.into(),
            root,
        }
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn root(&self) -> &PlanNode {
        &self.root
    }

    pub fn into_root(self) -> PlanNode {
        self.root
    }

    /// Pre-order listing of every node
    pub fn explain_output(&self) -> ExplainOutput {
        fn walk(node: &PlanNode, depth: usize, out: &mut Vec<ExplainNode>) {
            let (title, attributes) = node.print();
            out.push(ExplainNode {
                depth,
                title,
                attributes,
            });
            for input in node.inputs() {
                walk(input, depth + 1, out);
            }
        }

        let mut nodes = Vec::new();
        walk(&self.root, 0, &mut nodes);
        ExplainOutput {
            query_id: self.query_id.clone(),
            nodes,
        }
    }

    /// Indented text rendering
    pub fn explain(&self) -> String {
        let mut output = String::new();
        for node in self.explain_output().nodes {
            let pad = "  ".repeat(node.depth);
            output.push_str(&pad);
            output.push_str(&node.title);
            output.push('\n');
            for attribute in node.attributes {
                output.push_str(&pad);
                output.push_str("  ");
                output.push_str(&attribute);
                output.push('\n');
            }
        }
        output
    }

    /// JSON rendering of `explain_output`
    pub fn explain_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.explain_output())
    }
}

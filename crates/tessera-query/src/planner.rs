//! Logical planner: turns an analyzed statement into a plan tree

use crate::analysis::{Analysis, SchemaTree};
use crate::error::{QueryError, Result};
use crate::id::QueryContext;
use crate::optimizer::PlanOptimizer;
use crate::plan::{
    AlterTimeSeriesNode, AuthorNode, CreateAlignedTimeSeriesNode, CreateTimeSeriesNode, DeviceMergeNode, FillNode,
    FilterNode, FilterNullNode, GroupByLevelNode, InsertMultiTabletsNode, InsertRowNode, InsertRowsNode,
    InsertTabletNode, LimitNode, LogicalQueryPlan, OffsetNode, PlanNode, SortNode, SourceNode, TimeJoinNode,
};
use crate::statement::{
    FillComponent, FilterNullComponent, GroupByLevelComponent, InsertRowStatement, InsertTabletStatement, OrderBy,
    QueryFilter, QueryStatement, Statement,
};
use tessera_core::PartialPath;
use tracing::debug;

/// Builds logical plans for one query.
///
/// Optimizers run in the given order and only for read queries.
pub struct LogicalPlanner<'a> {
    context: &'a QueryContext,
    optimizers: Vec<Box<dyn PlanOptimizer>>,
}

impl<'a> LogicalPlanner<'a> {
    pub fn new(context: &'a QueryContext, optimizers: Vec<Box<dyn PlanOptimizer>>) -> Self {
        Self { context, optimizers }
    }

    pub fn plan(&self, analysis: &Analysis) -> Result<LogicalQueryPlan> {
        let statement = analysis.statement();
        debug!(
            query_id = %self.context.query_id(),
            kind = statement.kind(),
            "Planning statement"
        );

        let mut root = PlanVisitor {
            context: self.context,
            schema_tree: analysis.schema_tree(),
        }
        .visit(statement)?;

        if statement.is_query() {
            for optimizer in &self.optimizers {
                let before = root.node_count();
                root = optimizer.optimize(root, self.context)?;
                debug!(
                    optimizer = optimizer.name(),
                    nodes_before = before,
                    nodes_after = root.node_count(),
                    "Applied optimizer"
                );
            }
        }

        Ok(LogicalQueryPlan::new(self.context.query_id().id(), root))
    }
}

/// Dispatches on statement kind
struct PlanVisitor<'a> {
    context: &'a QueryContext,
    schema_tree: &'a SchemaTree,
}

impl PlanVisitor<'_> {
    fn visit(&self, statement: &Statement) -> Result<PlanNode> {
        match statement {
            Statement::Query(query) => self.visit_query(query),
            Statement::InsertRow(row) => Ok(PlanNode::InsertRow(self.insert_row(row)?)),
            Statement::InsertTablet(tablet) => Ok(PlanNode::InsertTablet(self.insert_tablet(tablet)?)),
            Statement::InsertRows(rows) => self.insert_rows(&rows.rows),
            Statement::InsertRowsOfOneDevice(rows) => self.insert_rows(&rows.rows),
            Statement::InsertMultiTablets(multi) => {
                let tablets = multi
                    .tablets
                    .iter()
                    .map(|t| self.insert_tablet(t))
                    .collect::<Result<Vec<_>>>()?;
                Ok(PlanNode::InsertMultiTablets(InsertMultiTabletsNode {
                    id: self.context.next_node_id(),
                    tablets,
                }))
            }
            Statement::CreateTimeSeries(s) => Ok(PlanNode::CreateTimeSeries(CreateTimeSeriesNode {
                id: self.context.next_node_id(),
                path: s.path.clone(),
                data_type: s.data_type,
                encoding: s.encoding,
                compressor: s.compressor,
                props: s.props.clone(),
                tags: s.tags.clone(),
                attributes: s.attributes.clone(),
                alias: s.alias.clone(),
            })),
            Statement::CreateAlignedTimeSeries(s) => {
                Ok(PlanNode::CreateAlignedTimeSeries(CreateAlignedTimeSeriesNode {
                    id: self.context.next_node_id(),
                    device_path: s.device_path.clone(),
                    measurements: s.measurements.clone(),
                    data_types: s.data_types.clone(),
                    encodings: s.encodings.clone(),
                    compressors: s.compressors.clone(),
                    aliases: s.aliases.clone(),
                    tags: s.tags.clone(),
                    attributes: s.attributes.clone(),
                }))
            }
            Statement::AlterTimeSeries(s) => Ok(PlanNode::AlterTimeSeries(AlterTimeSeriesNode {
                id: self.context.next_node_id(),
                path: s.path.clone(),
                alter_type: s.alter_type,
                alter_map: s.alter_map.clone(),
                alias: s.alias.clone(),
                tags: s.tags.clone(),
                attributes: s.attributes.clone(),
            })),
            Statement::Author(s) => Ok(PlanNode::Author(AuthorNode::new(self.context.next_node_id(), s)?)),
            Statement::SetStorageGroup(_) => Err(QueryError::UnsupportedStatement(statement.kind().to_string())),
        }
    }

    fn visit_query(&self, query: &QueryStatement) -> Result<PlanNode> {
        let root = self.plan_select(query)?;
        let plan = PlanBuilder::new(self.context, root)
            .with_filter(query.where_condition.as_ref())
            .with_group_by_level(query.group_by_level.as_ref())
            .with_fill(query.fill.as_ref())
            .with_filter_null(query.filter_null.as_ref())
            .with_sort(query.result_order)
            .with_limit(query.row_limit)
            .with_offset(query.row_offset)
            .build();
        Ok(plan)
    }

    /// One source per selected timeseries, joined by time or merged per device
    fn plan_select(&self, query: &QueryStatement) -> Result<PlanNode> {
        let paths = query.selected_paths();
        if paths.is_empty() {
            return Err(QueryError::Planning("no timeseries selected".to_string()));
        }

        let mut by_device: Vec<(String, Vec<PlanNode>)> = Vec::new();
        for path in paths {
            let source = SourceNode::new(self.context.next_node_id(), path, query.result_order);
            let device = source.device_name();
            let node = PlanNode::Source(source);
            match by_device.iter_mut().find(|(d, _)| *d == device) {
                Some((_, sources)) => sources.push(node),
                None => by_device.push((device, vec![node])),
            }
        }

        if query.align_by_device {
            let mut merge = DeviceMergeNode::new(self.context.next_node_id(), query.result_order);
            for (device, mut sources) in by_device {
                let child = if sources.len() == 1 {
                    sources.remove(0)
                } else {
                    PlanNode::TimeJoin(TimeJoinNode {
                        id: self.context.next_node_id(),
                        order: query.result_order,
                        children: sources,
                    })
                };
                merge.add_child_device_node(device, child);
            }
            return Ok(PlanNode::DeviceMerge(merge));
        }

        Ok(PlanNode::TimeJoin(TimeJoinNode {
            id: self.context.next_node_id(),
            order: query.result_order,
            children: by_device.into_iter().flat_map(|(_, sources)| sources).collect(),
        }))
    }

    fn insert_row(&self, row: &InsertRowStatement) -> Result<InsertRowNode> {
        check_arity(&row.device_path, row.measurements.len(), row.values.len())?;
        let schemas = self
            .schema_tree
            .search_measurement_schema(&row.device_path, &row.measurements)?;
        Ok(InsertRowNode {
            id: self.context.next_node_id(),
            device_path: row.device_path.clone(),
            aligned: row.aligned,
            schemas,
            data_types: row.data_types.clone(),
            time: row.time,
            values: row.values.clone(),
        })
    }

    fn insert_tablet(&self, tablet: &InsertTabletStatement) -> Result<InsertTabletNode> {
        check_arity(&tablet.device_path, tablet.measurements.len(), tablet.columns.len())?;
        let schemas = self
            .schema_tree
            .search_measurement_schema(&tablet.device_path, &tablet.measurements)?;
        Ok(InsertTabletNode {
            id: self.context.next_node_id(),
            device_path: tablet.device_path.clone(),
            aligned: tablet.aligned,
            schemas,
            data_types: tablet.data_types.clone(),
            times: tablet.times.clone(),
            columns: tablet.columns.clone(),
            row_count: tablet.row_count(),
        })
    }

    fn insert_rows(&self, rows: &[InsertRowStatement]) -> Result<PlanNode> {
        let mut node = InsertRowsNode::new(self.context.next_node_id());
        for (index, row) in rows.iter().enumerate() {
            node.add_one_insert_row_node(self.insert_row(row)?, index);
        }
        Ok(PlanNode::InsertRows(node))
    }
}

fn check_arity(device: &PartialPath, measurements: usize, values: usize) -> Result<()> {
    if measurements != values {
        return Err(QueryError::Planning(format!(
            "{} measurements but {} value columns for {}",
            measurements, values, device
        )));
    }
    Ok(())
}

/// Wraps the current root in one stage at a time; absent clauses are skipped
struct PlanBuilder<'a> {
    context: &'a QueryContext,
    root: PlanNode,
}

impl<'a> PlanBuilder<'a> {
    fn new(context: &'a QueryContext, root: PlanNode) -> Self {
        Self { context, root }
    }

    fn with_filter(self, predicate: Option<&QueryFilter>) -> Self {
        match predicate {
            Some(predicate) => {
                let id = self.context.next_node_id();
                self.wrap(|child| {
                    PlanNode::Filter(FilterNode {
                        id,
                        child: Box::new(child),
                        predicate: predicate.clone(),
                    })
                })
            }
            None => self,
        }
    }

    fn with_group_by_level(self, component: Option<&GroupByLevelComponent>) -> Self {
        match component {
            Some(component) => {
                let id = self.context.next_node_id();
                self.wrap(|child| {
                    PlanNode::GroupByLevel(GroupByLevelNode::new(
                        id,
                        child,
                        component.levels.clone(),
                        component.grouped_path_map.clone(),
                    ))
                })
            }
            None => self,
        }
    }

    fn with_fill(self, component: Option<&FillComponent>) -> Self {
        match component {
            Some(component) => {
                let id = self.context.next_node_id();
                self.wrap(|child| {
                    PlanNode::Fill(FillNode {
                        id,
                        child: Box::new(child),
                        policy: component.policy.clone(),
                    })
                })
            }
            None => self,
        }
    }

    fn with_filter_null(self, component: Option<&FilterNullComponent>) -> Self {
        match component {
            Some(component) => {
                let id = self.context.next_node_id();
                let columns = component.columns.iter().map(|c| c.to_string()).collect();
                self.wrap(|child| {
                    PlanNode::FilterNull(FilterNullNode {
                        id,
                        child: Box::new(child),
                        policy: component.policy,
                        columns,
                    })
                })
            }
            None => self,
        }
    }

    /// Sources already produce ascending time order
    fn with_sort(self, order: OrderBy) -> Self {
        if order == OrderBy::TimestampAsc {
            return self;
        }
        let id = self.context.next_node_id();
        self.wrap(|child| {
            PlanNode::Sort(SortNode {
                id,
                child: Box::new(child),
                order,
            })
        })
    }

    fn with_limit(self, limit: usize) -> Self {
        if limit == 0 {
            return self;
        }
        let id = self.context.next_node_id();
        self.wrap(|child| {
            PlanNode::Limit(LimitNode {
                id,
                child: Box::new(child),
                limit,
            })
        })
    }

    fn with_offset(self, offset: usize) -> Self {
        if offset == 0 {
            return self;
        }
        let id = self.context.next_node_id();
        self.wrap(|child| {
            PlanNode::Offset(OffsetNode {
                id,
                child: Box::new(child),
                offset,
            })
        })
    }

    fn wrap(self, f: impl FnOnce(PlanNode) -> PlanNode) -> Self {
        Self {
            context: self.context,
            root: f(self.root),
        }
    }

    fn build(self) -> PlanNode {
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::MeasurementSchema;
    use crate::statement::{
        AuthorStatement, AuthorType, CompareOp, CreateTimeSeriesStatement, DataType, Expression, FillPolicy,
        FilterNullPolicy, InsertRowsOfOneDeviceStatement, SetStorageGroupStatement, Value,
    };

    fn path(s: &str) -> PartialPath {
        PartialPath::new(s).unwrap()
    }

    fn plan(statement: Statement) -> Result<LogicalQueryPlan> {
        let context = QueryContext::new("test");
        LogicalPlanner::new(&context, Vec::new()).plan(&Analysis::new(statement))
    }

    fn shape(node: &PlanNode) -> Vec<&'static str> {
        let mut names = vec![node.name()];
        let mut current = node;
        while let Some(first) = current.inputs().first().copied() {
            names.push(first.name());
            current = first;
        }
        names
    }

    #[test]
    fn test_clauses_absent_leave_bare_join() {
        let query = QueryStatement::builder()
            .select(path("root.sg.d1.s1"))
            .select(path("root.sg.d2.s1"))
            .build()
            .unwrap();
        let plan = plan(Statement::Query(query)).unwrap();

        assert_eq!(shape(plan.root()), vec!["TimeJoinNode", "SourceNode"]);
        assert_eq!(
            plan.root().output_column_names(),
            vec!["root.sg.d1.s1", "root.sg.d2.s1"]
        );
    }

    #[test]
    fn test_every_stage_in_order() {
        let query = QueryStatement::builder()
            .select(path("root.sg.d1.s1"))
            .filter(QueryFilter::compare(path("root.sg.d1.s1"), CompareOp::Gt, Value::Int32(1)))
            .group_by_level(vec![0, 1])
            .fill(FillPolicy::Previous)
            .without_null(FilterNullPolicy::AllNull, Vec::new())
            .order_by(OrderBy::TimestampDesc)
            .limit(10)
            .offset(5)
            .build()
            .unwrap();
        let plan = plan(Statement::Query(query)).unwrap();

        assert_eq!(
            shape(plan.root()),
            vec![
                "OffsetNode",
                "LimitNode",
                "SortNode",
                "FilterNullNode",
                "FillNode",
                "GroupByLevelNode",
                "FilterNode",
                "TimeJoinNode",
                "SourceNode",
            ]
        );
    }

    #[test]
    fn test_align_by_device_joins_multi_source_devices() {
        let query = QueryStatement::builder()
            .select(path("root.sg.d1.s1"))
            .select(path("root.sg.d2.s1"))
            .select(path("root.sg.d1.s2"))
            .align_by_device()
            .build()
            .unwrap();
        let plan = plan(Statement::Query(query)).unwrap();

        let PlanNode::DeviceMerge(merge) = plan.root() else {
            panic!("expected device merge, got {}", plan.root().name());
        };
        assert_eq!(merge.devices, vec!["root.sg.d1", "root.sg.d2"]);
        assert!(matches!(&merge.children[0], PlanNode::TimeJoin(j) if j.children.len() == 2));
        assert!(matches!(&merge.children[1], PlanNode::Source(_)));
    }

    #[test]
    fn test_function_arguments_become_sources() {
        let query = QueryStatement::builder()
            .select_expression(
                Expression::function("sin", vec![Expression::timeseries(path("root.sg.d1.s1"))]),
                None,
            )
            .build()
            .unwrap();
        let plan = plan(Statement::Query(query)).unwrap();
        assert_eq!(plan.root().output_column_names(), vec!["root.sg.d1.s1"]);

        let constant_only = QueryStatement::builder()
            .select_expression(Expression::Constant(Value::Int32(1)), None)
            .build()
            .unwrap();
        assert!(matches!(
            plan_err(Statement::Query(constant_only)),
            QueryError::Planning(_)
        ));
    }

    fn plan_err(statement: Statement) -> QueryError {
        match plan(statement) {
            Ok(plan) => panic!("expected error, planned {}", plan.root().name()),
            Err(e) => e,
        }
    }

    #[test]
    fn test_insert_rows_of_one_device_resolves_schemas() {
        let device = path("root.sg.d1");
        let mut tree = SchemaTree::new();
        tree.append_schema(&device, MeasurementSchema::new("s1", DataType::Int32));

        let row = |time: i64| InsertRowStatement {
            device_path: device.clone(),
            aligned: false,
            measurements: vec!["s1".to_string()],
            data_types: vec![DataType::Int32],
            time,
            values: vec![Value::Int32(1)],
        };
        let statement = Statement::InsertRowsOfOneDevice(InsertRowsOfOneDeviceStatement {
            device_path: device.clone(),
            rows: vec![row(1), row(2)],
        });

        let context = QueryContext::new("insert");
        let plan = LogicalPlanner::new(&context, Vec::new())
            .plan(&Analysis::new(statement).with_schema_tree(tree))
            .unwrap();
        let PlanNode::InsertRows(rows) = plan.root() else {
            panic!("expected insert rows");
        };
        assert_eq!(rows.row_indexes, vec![0, 1]);
        assert_eq!(rows.rows[1].schemas[0].data_type, DataType::Int32);

        let missing = Statement::InsertRow(InsertRowStatement {
            measurements: vec!["s9".to_string()],
            ..row(3)
        });
        assert!(plan_err(missing).to_string().contains("root.sg.d1"));
    }

    #[test]
    fn test_schema_and_author_statements() {
        let create = plan(Statement::CreateTimeSeries(CreateTimeSeriesStatement::new(
            path("root.sg.d1.s1"),
            DataType::Float,
        )))
        .unwrap();
        assert!(matches!(create.root(), PlanNode::CreateTimeSeries(n) if n.data_type == DataType::Float));

        let mut grant = AuthorStatement::new(AuthorType::GrantRole);
        grant.privileges = vec!["NOT_A_PRIVILEGE".to_string()];
        assert!(matches!(plan_err(Statement::Author(grant)), QueryError::Auth(_)));

        let set_sg = Statement::SetStorageGroup(SetStorageGroupStatement { path: path("root.sg") });
        assert!(matches!(plan_err(set_sg), QueryError::UnsupportedStatement(_)));
    }
}

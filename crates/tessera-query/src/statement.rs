//! Parsed statement model
//!
//! Statements arrive here already parsed and analyzed; the planner only
//! reads them.

use crate::error::{QueryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tessera_core::PartialPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float,
    Double,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    Plain,
    Rle,
    Ts2Diff,
    Gorilla,
    Dictionary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compressor {
    Uncompressed,
    Snappy,
    Lz4,
    Gzip,
}

/// A single typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v),
        }
    }
}

// ---------------------------------------------------------------------------
// Query components
// ---------------------------------------------------------------------------

/// Select-list expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Timeseries(PartialPath),
    Constant(Value),
    Function { name: String, args: Vec<Expression> },
}

impl Expression {
    pub fn timeseries(path: PartialPath) -> Self {
        Expression::Timeseries(path)
    }

    pub fn function(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Function {
            name: name.into(),
            args,
        }
    }

    /// Timeseries read by this expression, in first-appearance order
    pub fn collect_paths(&self, out: &mut Vec<PartialPath>) {
        match self {
            Expression::Timeseries(path) => {
                if !out.contains(path) {
                    out.push(path.clone());
                }
            }
            Expression::Constant(_) => {}
            Expression::Function { args, .. } => {
                for arg in args {
                    arg.collect_paths(out);
                }
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Timeseries(path) => write!(f, "{}", path),
            Expression::Constant(value) => write!(f, "{}", value),
            Expression::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// One column of the select list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub expression: Expression,
    pub alias: Option<String>,
}

impl ResultColumn {
    pub fn new(expression: Expression) -> Self {
        Self {
            expression,
            alias: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        };
        f.write_str(op)
    }
}

/// Row predicate of the where clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryFilter {
    Compare {
        path: PartialPath,
        op: CompareOp,
        value: Value,
    },
    And(Vec<QueryFilter>),
    Or(Vec<QueryFilter>),
    Not(Box<QueryFilter>),
}

impl QueryFilter {
    pub fn compare(path: PartialPath, op: CompareOp, value: Value) -> Self {
        QueryFilter::Compare { path, op, value }
    }

    /// Every timeseries the predicate reads
    pub fn paths(&self) -> BTreeSet<PartialPath> {
        let mut paths = BTreeSet::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths(&self, out: &mut BTreeSet<PartialPath>) {
        match self {
            QueryFilter::Compare { path, .. } => {
                out.insert(path.clone());
            }
            QueryFilter::And(filters) | QueryFilter::Or(filters) => {
                for filter in filters {
                    filter.collect_paths(out);
                }
            }
            QueryFilter::Not(inner) => inner.collect_paths(out),
        }
    }

    /// Conjunction of `self` and `other`, flattening nested ANDs
    pub fn and(self, other: QueryFilter) -> QueryFilter {
        match (self, other) {
            (QueryFilter::And(mut left), QueryFilter::And(right)) => {
                left.extend(right);
                QueryFilter::And(left)
            }
            (QueryFilter::And(mut left), right) => {
                left.push(right);
                QueryFilter::And(left)
            }
            (left, right) => QueryFilter::And(vec![left, right]),
        }
    }
}

impl fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, filters: &[QueryFilter], sep: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, filter) in filters.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{}", filter)?;
            }
            f.write_str(")")
        }

        match self {
            QueryFilter::Compare { path, op, value } => write!(f, "{} {} {}", path, op, value),
            QueryFilter::And(filters) => join(f, filters, " & "),
            QueryFilter::Or(filters) => join(f, filters, " | "),
            QueryFilter::Not(inner) => write!(f, "!{}", inner),
        }
    }
}

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderBy {
    #[default]
    TimestampAsc,
    TimestampDesc,
    DeviceAsc,
    DeviceDesc,
}

/// `GROUP BY LEVEL` clause with its precomputed column to bucket mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupByLevelComponent {
    pub levels: Vec<usize>,
    /// (column, bucket) pairs in select-list order
    pub grouped_path_map: Vec<(String, String)>,
}

impl GroupByLevelComponent {
    /// Map each column to its rolled-up bucket at `levels`
    pub fn new(levels: Vec<usize>, columns: &[PartialPath]) -> Self {
        let mut grouped_path_map: Vec<(String, String)> = Vec::with_capacity(columns.len());
        for column in columns {
            if grouped_path_map.iter().any(|(c, _)| c == column.full_path()) {
                continue;
            }
            let bucket = column.rollup(&levels);
            grouped_path_map.push((column.full_path().to_string(), bucket.full_path().to_string()));
        }
        Self {
            levels,
            grouped_path_map,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FillPolicy {
    Previous,
    Linear,
    Value(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillComponent {
    pub policy: FillPolicy,
}

/// Which rows `WITHOUT NULL` drops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterNullPolicy {
    /// Drop rows where any checked column is null
    ContainsNull,
    /// Drop rows where all checked columns are null
    AllNull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterNullComponent {
    pub policy: FilterNullPolicy,
    /// Checked columns; empty checks every column
    pub columns: Vec<Expression>,
}

/// A read query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStatement {
    pub select: Vec<ResultColumn>,
    pub where_condition: Option<QueryFilter>,
    pub group_by_level: Option<GroupByLevelComponent>,
    pub fill: Option<FillComponent>,
    pub filter_null: Option<FilterNullComponent>,
    pub result_order: OrderBy,
    /// 0 means no limit
    pub row_limit: usize,
    pub row_offset: usize,
    pub align_by_device: bool,
}

impl QueryStatement {
    pub fn builder() -> QueryStatementBuilder {
        QueryStatementBuilder::default()
    }

    /// Timeseries read by the select list, in first-appearance order
    pub fn selected_paths(&self) -> Vec<PartialPath> {
        let mut paths = Vec::new();
        for column in &self.select {
            column.expression.collect_paths(&mut paths);
        }
        paths
    }
}

/// Fluent builder for `QueryStatement`
#[derive(Default)]
pub struct QueryStatementBuilder {
    select: Vec<ResultColumn>,
    where_condition: Option<QueryFilter>,
    group_by_levels: Option<Vec<usize>>,
    fill: Option<FillComponent>,
    filter_null: Option<FilterNullComponent>,
    result_order: OrderBy,
    row_limit: usize,
    row_offset: usize,
    align_by_device: bool,
}

impl QueryStatementBuilder {
    /// Select a raw timeseries
    pub fn select(mut self, path: PartialPath) -> Self {
        self.select.push(ResultColumn::new(Expression::Timeseries(path)));
        self
    }

    /// Select an arbitrary expression
    pub fn select_expression(mut self, expression: Expression, alias: Option<String>) -> Self {
        self.select.push(ResultColumn { expression, alias });
        self
    }

    pub fn filter(mut self, filter: QueryFilter) -> Self {
        self.where_condition = Some(filter);
        self
    }

    pub fn group_by_level(mut self, levels: Vec<usize>) -> Self {
        self.group_by_levels = Some(levels);
        self
    }

    pub fn fill(mut self, policy: FillPolicy) -> Self {
        self.fill = Some(FillComponent { policy });
        self
    }

    pub fn without_null(mut self, policy: FilterNullPolicy, columns: Vec<Expression>) -> Self {
        self.filter_null = Some(FilterNullComponent { policy, columns });
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.result_order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.row_limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.row_offset = offset;
        self
    }

    pub fn align_by_device(mut self) -> Self {
        self.align_by_device = true;
        self
    }

    pub fn build(self) -> Result<QueryStatement> {
        if self.select.is_empty() {
            return Err(QueryError::Planning("select list is empty".to_string()));
        }
        let mut statement = QueryStatement {
            select: self.select,
            where_condition: self.where_condition,
            group_by_level: None,
            fill: self.fill,
            filter_null: self.filter_null,
            result_order: self.result_order,
            row_limit: self.row_limit,
            row_offset: self.row_offset,
            align_by_device: self.align_by_device,
        };
        if let Some(levels) = self.group_by_levels {
            if statement.align_by_device {
                return Err(QueryError::Planning(
                    "GROUP BY LEVEL cannot be used with ALIGN BY DEVICE".to_string(),
                ));
            }
            let columns = statement.selected_paths();
            statement.group_by_level = Some(GroupByLevelComponent::new(levels, &columns));
        }
        Ok(statement)
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRowStatement {
    pub device_path: PartialPath,
    pub aligned: bool,
    pub measurements: Vec<String>,
    pub data_types: Vec<DataType>,
    pub time: i64,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertTabletStatement {
    pub device_path: PartialPath,
    pub aligned: bool,
    pub measurements: Vec<String>,
    pub data_types: Vec<DataType>,
    pub times: Vec<i64>,
    /// One column per measurement; `None` marks a null cell
    pub columns: Vec<Vec<Option<Value>>>,
}

impl InsertTabletStatement {
    pub fn row_count(&self) -> usize {
        self.times.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRowsStatement {
    pub rows: Vec<InsertRowStatement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRowsOfOneDeviceStatement {
    pub device_path: PartialPath,
    pub rows: Vec<InsertRowStatement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertMultiTabletsStatement {
    pub tablets: Vec<InsertTabletStatement>,
}

// ---------------------------------------------------------------------------
// Schema and access control
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTimeSeriesStatement {
    pub path: PartialPath,
    pub data_type: DataType,
    pub encoding: Encoding,
    pub compressor: Compressor,
    pub props: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, String>,
    pub alias: Option<String>,
}

impl CreateTimeSeriesStatement {
    pub fn new(path: PartialPath, data_type: DataType) -> Self {
        Self {
            path,
            data_type,
            encoding: Encoding::Plain,
            compressor: Compressor::Snappy,
            props: BTreeMap::new(),
            tags: BTreeMap::new(),
            attributes: BTreeMap::new(),
            alias: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAlignedTimeSeriesStatement {
    pub device_path: PartialPath,
    pub measurements: Vec<String>,
    pub data_types: Vec<DataType>,
    pub encodings: Vec<Encoding>,
    pub compressors: Vec<Compressor>,
    pub aliases: Vec<Option<String>>,
    pub tags: Vec<BTreeMap<String, String>>,
    pub attributes: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlterType {
    Rename,
    Set,
    Drop,
    AddTags,
    AddAttributes,
    Upsert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlterTimeSeriesStatement {
    pub path: PartialPath,
    pub alter_type: AlterType,
    pub alter_map: BTreeMap<String, String>,
    pub alias: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorType {
    CreateUser,
    CreateRole,
    UpdateUser,
    GrantUser,
    GrantRole,
    GrantUserRole,
    RevokeUser,
    RevokeRole,
    RevokeUserRole,
    DropUser,
    DropRole,
    ListUser,
    ListRole,
    ListUserPrivileges,
    ListRolePrivileges,
    ListUserRoles,
    ListRoleUsers,
}

/// User and role management
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorStatement {
    pub author_type: AuthorType,
    pub user_name: Option<String>,
    pub role_name: Option<String>,
    pub password: Option<String>,
    pub new_password: Option<String>,
    pub privileges: Vec<String>,
    pub node_name: Option<PartialPath>,
}

impl AuthorStatement {
    pub fn new(author_type: AuthorType) -> Self {
        Self {
            author_type,
            user_name: None,
            role_name: None,
            password: None,
            new_password: None,
            privileges: Vec::new(),
            node_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStorageGroupStatement {
    pub path: PartialPath,
}

/// Every statement kind the planner understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Query(QueryStatement),
    InsertRow(InsertRowStatement),
    InsertTablet(InsertTabletStatement),
    InsertRows(InsertRowsStatement),
    InsertRowsOfOneDevice(InsertRowsOfOneDeviceStatement),
    InsertMultiTablets(InsertMultiTabletsStatement),
    CreateTimeSeries(CreateTimeSeriesStatement),
    CreateAlignedTimeSeries(CreateAlignedTimeSeriesStatement),
    AlterTimeSeries(AlterTimeSeriesStatement),
    Author(AuthorStatement),
    SetStorageGroup(SetStorageGroupStatement),
}

impl Statement {
    pub fn is_query(&self) -> bool {
        matches!(self, Statement::Query(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Query(_) => "Query",
            Statement::InsertRow(_) => "InsertRow",
            Statement::InsertTablet(_) => "InsertTablet",
            Statement::InsertRows(_) => "InsertRows",
            Statement::InsertRowsOfOneDevice(_) => "InsertRowsOfOneDevice",
            Statement::InsertMultiTablets(_) => "InsertMultiTablets",
            Statement::CreateTimeSeries(_) => "CreateTimeSeries",
            Statement::CreateAlignedTimeSeries(_) => "CreateAlignedTimeSeries",
            Statement::AlterTimeSeries(_) => "AlterTimeSeries",
            Statement::Author(_) => "Author",
            Statement::SetStorageGroup(_) => "SetStorageGroup",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> PartialPath {
        PartialPath::new(s).unwrap()
    }

    #[test]
    fn test_builder_requires_select() {
        assert!(matches!(
            QueryStatement::builder().limit(10).build(),
            Err(QueryError::Planning(_))
        ));
    }

    #[test]
    fn test_selected_paths_dedup_in_order() {
        let statement = QueryStatement::builder()
            .select(path("root.sg.d2.s1"))
            .select_expression(
                Expression::function(
                    "add",
                    vec![
                        Expression::timeseries(path("root.sg.d1.s1")),
                        Expression::timeseries(path("root.sg.d2.s1")),
                    ],
                ),
                None,
            )
            .build()
            .unwrap();

        assert_eq!(
            statement.selected_paths(),
            vec![path("root.sg.d2.s1"), path("root.sg.d1.s1")]
        );
        assert_eq!(
            statement.select[1].expression.to_string(),
            "add(root.sg.d1.s1, root.sg.d2.s1)"
        );
    }

    #[test]
    fn test_group_by_level_component_keeps_select_order() {
        let columns = [path("root.sg.d2.s1"), path("root.sg.d1.s1"), path("root.sg.d1.s2")];
        let component = GroupByLevelComponent::new(vec![0, 1], &columns);

        assert_eq!(
            component.grouped_path_map,
            vec![
                ("root.sg.d2.s1".to_string(), "root.sg.*.s1".to_string()),
                ("root.sg.d1.s1".to_string(), "root.sg.*.s1".to_string()),
                ("root.sg.d1.s2".to_string(), "root.sg.*.s2".to_string()),
            ]
        );
    }

    #[test]
    fn test_group_by_level_rejects_device_alignment() {
        let result = QueryStatement::builder()
            .select(path("root.sg.d1.s1"))
            .group_by_level(vec![1])
            .align_by_device()
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_filter_paths_and_conjunction() {
        let a = QueryFilter::compare(path("root.sg.d1.s1"), CompareOp::Gt, Value::Int32(3));
        let b = QueryFilter::compare(path("root.sg.d1.s2"), CompareOp::Eq, Value::Text("on".into()));
        let c = QueryFilter::Not(Box::new(a.clone()));

        let both = a.and(b).and(c);
        match &both {
            QueryFilter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected conjunction, got {:?}", other),
        }
        assert_eq!(both.paths().len(), 2);
        assert_eq!(
            both.to_string(),
            "(root.sg.d1.s1 > 3 & root.sg.d1.s2 = 'on' & !root.sg.d1.s1 > 3)"
        );
    }

    #[test]
    fn test_statement_serde() {
        let statement = Statement::CreateTimeSeries(CreateTimeSeriesStatement::new(
            path("root.sg.d1.s1"),
            DataType::Double,
        ));
        let json = serde_json::to_string(&statement).unwrap();
        let back: Statement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, statement);
        assert_eq!(back.kind(), "CreateTimeSeries");
        assert!(!back.is_query());
    }
}

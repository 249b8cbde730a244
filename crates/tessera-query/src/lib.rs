//! Tessera Query - Logical planning for the Tessera time series cluster
//!
//! This crate turns analyzed statements into logical plan trees:
//! - `statement`: parsed query, insert, schema and access-control statements
//! - `planner`: `LogicalPlanner`, which assembles query stages in a fixed order
//! - `plan`: the plan node variants, including the `GroupByLevelNode` rollup
//! - `optimizer`: rewrite passes run over read-query plans

pub mod analysis;
pub mod error;
pub mod id;
pub mod optimizer;
pub mod plan;
pub mod planner;
pub mod statement;

pub use analysis::{Analysis, MeasurementSchema, SchemaTree};
pub use error::{QueryError, Result};
pub use id::{FragmentInstanceId, PlanFragmentId, PlanNodeId, QueryContext, QueryId};
pub use optimizer::{default_optimizers, PlanOptimizer, PredicatePushdown, RemoveRedundantJoin};
pub use plan::{GroupByLevelNode, LogicalQueryPlan, PlanNode};
pub use planner::LogicalPlanner;
pub use statement::{QueryStatement, Statement};

//! Rewrite passes applied to read-query plans

use crate::error::Result;
use crate::id::QueryContext;
use crate::plan::{FilterNode, PlanNode};

/// A single rewrite of a plan tree.
///
/// A rewrite may replace the root but must keep the output columns of the
/// tree and their order unchanged.
pub trait PlanOptimizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn optimize(&self, root: PlanNode, context: &QueryContext) -> Result<PlanNode>;
}

/// The rules every planner runs, in order
pub fn default_optimizers() -> Vec<Box<dyn PlanOptimizer>> {
    vec![Box::new(RemoveRedundantJoin), Box::new(PredicatePushdown)]
}

/// Apply `rule` to every node, children first
fn rewrite_bottom_up<F>(node: PlanNode, rule: &F) -> Result<PlanNode>
where
    F: Fn(PlanNode) -> PlanNode,
{
    let node = node.map_inputs(|child| rewrite_bottom_up(child, rule))?;
    Ok(rule(node))
}

/// Replaces a time join over one input with that input
pub struct RemoveRedundantJoin;

impl PlanOptimizer for RemoveRedundantJoin {
    fn name(&self) -> &'static str {
        "RemoveRedundantJoin"
    }

    fn optimize(&self, root: PlanNode, _context: &QueryContext) -> Result<PlanNode> {
        rewrite_bottom_up(root, &|node| match node {
            PlanNode::TimeJoin(mut join) if join.children.len() == 1 => join.children.remove(0),
            other => other,
        })
    }
}

/// Folds a filter into the source scan directly below it when the predicate
/// only reads that source's timeseries
pub struct PredicatePushdown;

impl PlanOptimizer for PredicatePushdown {
    fn name(&self) -> &'static str {
        "PredicatePushdown"
    }

    fn optimize(&self, root: PlanNode, _context: &QueryContext) -> Result<PlanNode> {
        rewrite_bottom_up(root, &|node| match node {
            PlanNode::Filter(filter) => match *filter.child {
                PlanNode::Source(mut source) if filter.predicate.paths().iter().all(|p| *p == source.path) => {
                    source.predicate = Some(match source.predicate.take() {
                        Some(existing) => existing.and(filter.predicate),
                        None => filter.predicate,
                    });
                    PlanNode::Source(source)
                }
                child => PlanNode::Filter(FilterNode {
                    child: Box::new(child),
                    ..filter
                }),
            },
            other => other,
        })
    }
}

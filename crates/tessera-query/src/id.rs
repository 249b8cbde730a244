//! Query, fragment and plan node identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one node within a plan tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanNodeId(String);

impl PlanNodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one query and hands out the ids of its plan nodes.
///
/// Ids are unique within the query and increase in generation order.
#[derive(Debug)]
pub struct QueryId {
    id: String,
    next_plan_node_id: AtomicU64,
}

impl QueryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            next_plan_node_id: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next unused plan node id
    pub fn gen_plan_node_id(&self) -> PlanNodeId {
        let next = self.next_plan_node_id.fetch_add(1, Ordering::Relaxed);
        PlanNodeId(next.to_string())
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A fragment of a distributed query plan
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanFragmentId {
    query_id: String,
    id: u32,
}

impl PlanFragmentId {
    pub fn new(query_id: &QueryId, id: u32) -> Self {
        Self {
            query_id: query_id.id().to_string(),
            id,
        }
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

impl fmt::Display for PlanFragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.query_id, self.id)
    }
}

/// One running instance of a fragment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentInstanceId {
    fragment_id: PlanFragmentId,
    instance_id: String,
}

impl FragmentInstanceId {
    pub fn new(fragment_id: PlanFragmentId, instance_id: impl Into<String>) -> Self {
        Self {
            fragment_id,
            instance_id: instance_id.into(),
        }
    }

    pub fn fragment_id(&self) -> &PlanFragmentId {
        &self.fragment_id
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// `<query>.<fragment>.<instance>`
    pub fn full_id(&self) -> String {
        format!("{}.{}", self.fragment_id, self.instance_id)
    }
}

impl fmt::Display for FragmentInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.fragment_id, self.instance_id)
    }
}

/// State shared by every planning step of one query
#[derive(Debug)]
pub struct QueryContext {
    query_id: QueryId,
}

impl QueryContext {
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            query_id: QueryId::new(query_id),
        }
    }

    pub fn query_id(&self) -> &QueryId {
        &self.query_id
    }

    /// Shorthand for `query_id().gen_plan_node_id()`
    pub fn next_node_id(&self) -> PlanNodeId {
        self.query_id.gen_plan_node_id()
    }
}

//! Sync-before-read gate
//!
//! Every metadata read that may be answered from local state first asks the
//! consensus layer to catch the local replica up with the relevant leader.

use crate::error::{ClusterError, ConsistencyError, Result};
use crate::partition::RaftNode;
use std::sync::Arc;
use tracing::{debug, warn};

/// Consensus capability consumed by the query core
pub trait ConsensusLayer: Send + Sync {
    /// Catch up with the metadata leader
    fn sync_leader_with_consistency_check(&self, strict: bool) -> std::result::Result<(), ConsistencyError>;

    /// Catch up with the leader of the data group identified by `header`
    fn sync_group_leader_with_consistency_check(
        &self,
        header: &RaftNode,
        strict: bool,
    ) -> std::result::Result<(), ConsistencyError>;
}

/// Consensus layer for a single-node deployment; local state is always fresh
#[derive(Debug, Default, Clone, Copy)]
pub struct StandaloneConsensus;

impl ConsensusLayer for StandaloneConsensus {
    fn sync_leader_with_consistency_check(&self, _strict: bool) -> std::result::Result<(), ConsistencyError> {
        Ok(())
    }

    fn sync_group_leader_with_consistency_check(
        &self,
        _header: &RaftNode,
        _strict: bool,
    ) -> std::result::Result<(), ConsistencyError> {
        Ok(())
    }
}

/// Applies the configured strictness to every consistency check
#[derive(Clone)]
pub struct ConsistencyGate {
    consensus: Arc<dyn ConsensusLayer>,
    strict: bool,
}

impl ConsistencyGate {
    pub fn new(consensus: Arc<dyn ConsensusLayer>, strict: bool) -> Self {
        Self { consensus, strict }
    }

    /// Sync with the metadata leader, failing on error
    pub fn sync_meta(&self) -> Result<()> {
        self.consensus
            .sync_leader_with_consistency_check(self.strict)
            .map_err(ClusterError::from)?;
        debug!("Metadata leader sync complete");
        Ok(())
    }

    /// Sync with the metadata leader, logging instead of failing
    pub fn sync_meta_best_effort(&self) -> bool {
        match self.consensus.sync_leader_with_consistency_check(self.strict) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to check consistency, answering from local metadata");
                false
            }
        }
    }

    /// Sync the local replica of the group headed by `header`
    pub fn sync_group(&self, header: &RaftNode) -> Result<()> {
        self.consensus
            .sync_group_leader_with_consistency_check(header, self.strict)
            .map_err(ClusterError::from)?;
        debug!(group = %header, "Group leader sync complete");
        Ok(())
    }
}

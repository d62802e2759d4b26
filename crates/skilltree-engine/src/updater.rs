use skilltree_store::{ProgressPatch, ProgressStore};
use skilltree_types::{NodeId, UserId};
use tracing::{debug, warn};

use crate::{AnchorChange, UnlockDecision};

/// Outcome of persisting a batch of decisions
#[derive(Debug, Clone, Default)]
pub struct UpdateSummary {
    /// Nodes whose rows were written
    pub applied: Vec<NodeId>,

    /// Nodes whose writes failed (logged, not rolled back)
    pub failed: Vec<NodeId>,
}

impl UpdateSummary {
    /// True when every write landed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Persist evaluator decisions back to the progress store.
///
/// One independent write per decision; a failure is logged and counted but
/// neither rolls back nor aborts the rest of the batch.
pub async fn apply_decisions(
    store: &dyn ProgressStore,
    user_id: UserId,
    decisions: &[UnlockDecision],
) -> UpdateSummary {
    let mut summary = UpdateSummary::default();

    for decision in decisions {
        let patch = ProgressPatch {
            unlocked: Some(decision.unlocked),
            cluster_skill_pt: decision.total_skill_points,
            unlock_start_time: match decision.anchor {
                AnchorChange::Unchanged => None,
                AnchorChange::Set(at) => Some(Some(at)),
                AnchorChange::Cleared => Some(None),
            },
            ..Default::default()
        };

        match store.update_progress(user_id, decision.node_id, patch).await {
            Ok(()) => {
                debug!(
                    "Persisted unlock decision for user {} node {}: unlocked={}",
                    user_id, decision.node_id, decision.unlocked
                );
                summary.applied.push(decision.node_id);
            }
            Err(e) => {
                warn!(
                    "Failed to persist unlock decision for user {} node {}: {}",
                    user_id, decision.node_id, e
                );
                summary.failed.push(decision.node_id);
            }
        }
    }

    summary
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skilltree_types::NodeId;

pub mod aggregator;
pub mod evaluator;
pub mod service;
pub mod updater;

pub use aggregator::{aggregate_skill, build_adjacency};
pub use evaluator::evaluate_node;
pub use service::ProgressionService;
pub use updater::{apply_decisions, UpdateSummary};

/// The countdown-anchor transition a decision carries.
///
/// Decisions describe the anchor mutation explicitly instead of editing the
/// progress snapshot in place, so the updater can apply them as independent
/// writes and the evaluator stays pure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnchorChange {
    /// Leave the stored `unlock_start_time` as it is
    Unchanged,

    /// Start a countdown: set `unlock_start_time` to this instant
    Set(DateTime<Utc>),

    /// Clear `unlock_start_time` back to null
    Cleared,
}

/// The evaluator's verdict for one node under one progress snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnlockDecision {
    /// The node this decision is for
    pub node_id: NodeId,

    /// The new unlocked state
    pub unlocked: bool,

    /// Aggregate cluster skill, reported for cluster-threshold nodes only
    pub total_skill_points: Option<i64>,

    /// Countdown-anchor transition to persist alongside the unlocked flag
    pub anchor: AnchorChange,
}

impl UnlockDecision {
    /// A decision with no countdown bookkeeping attached
    pub fn stateless(node_id: NodeId, unlocked: bool) -> Self {
        Self {
            node_id,
            unlocked,
            total_skill_points: None,
            anchor: AnchorChange::Unchanged,
        }
    }
}

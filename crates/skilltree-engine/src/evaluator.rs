use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use skilltree_types::{
    CourseProgress, Node, NodeId, NodeKind, ProgressionError, ProgressionResult, UnlockType,
};

use crate::aggregator::{aggregate_skill, build_adjacency};
use crate::{AnchorChange, UnlockDecision};

/// Decide the new unlocked state for one node under one progress snapshot.
///
/// Pure: `now` is injected and the snapshot is never mutated; the countdown
/// bookkeeping comes back as an explicit [`AnchorChange`] on the decision.
/// A node whose authored configuration is inconsistent yields
/// `ConfigurationError`; batch callers skip that node and leave its row at
/// its last-known-good state.
pub fn evaluate_node(
    node: &Node,
    progress: &HashMap<NodeId, CourseProgress>,
    nodes: &HashMap<NodeId, Node>,
    now: DateTime<Utc>,
) -> ProgressionResult<UnlockDecision> {
    validate_config(node)?;

    match node.kind {
        NodeKind::BigCheck => {
            // A milestone with no prerequisites is always open
            if !node.has_prerequisites() {
                return Ok(UnlockDecision::stateless(node.id, true));
            }

            match node.unlock_type {
                UnlockType::ClusterTotalSkillPoint => Ok(evaluate_cluster(node, progress, nodes)),
                UnlockType::TimeBased => {
                    let satisfied = prerequisites_unlocked(node, progress);
                    Ok(evaluate_time_based(node, progress, satisfied, now))
                }
                UnlockType::SkillPoint => unreachable!("rejected by validate_config"),
            }
        }
        NodeKind::MajorNode | NodeKind::MinorNode => match node.unlock_type {
            UnlockType::SkillPoint => {
                let satisfied = prerequisites_leveled(node, progress);
                Ok(UnlockDecision::stateless(node.id, satisfied))
            }
            UnlockType::TimeBased => {
                let satisfied = prerequisites_leveled(node, progress);
                Ok(evaluate_time_based(node, progress, satisfied, now))
            }
            UnlockType::ClusterTotalSkillPoint => unreachable!("rejected by validate_config"),
        },
    }
}

/// Reject authored configurations the decision policy has no branch for
fn validate_config(node: &Node) -> ProgressionResult<()> {
    match (node.kind, node.unlock_type) {
        (NodeKind::BigCheck, UnlockType::SkillPoint) => {
            Err(ProgressionError::ConfigurationError(format!(
                "node {}: BigCheck cannot use the SkillPoint unlock type",
                node.id
            )))
        }
        (NodeKind::MajorNode | NodeKind::MinorNode, UnlockType::ClusterTotalSkillPoint) => {
            Err(ProgressionError::ConfigurationError(format!(
                "node {}: only BigChecks can use the ClusterTotalSkillPoint unlock type",
                node.id
            )))
        }
        (_, UnlockType::TimeBased) if node.unlock_dep_time_interval.is_none() => {
            Err(ProgressionError::ConfigurationError(format!(
                "node {}: TimeBased unlock without unlock_dep_time_interval",
                node.id
            )))
        }
        _ => Ok(()),
    }
}

/// Cluster-threshold unlock: a stateless re-derivation every call
fn evaluate_cluster(
    node: &Node,
    progress: &HashMap<NodeId, CourseProgress>,
    nodes: &HashMap<NodeId, Node>,
) -> UnlockDecision {
    let adjacency = build_adjacency(nodes);

    let total: i64 = node
        .unlock_dependencies_to
        .iter()
        .map(|edge| {
            let mut visited = HashSet::new();
            aggregate_skill(edge.from_node_id, nodes, progress, &adjacency, &mut visited)
        })
        .sum();

    UnlockDecision {
        node_id: node.id,
        unlocked: total >= node.cluster_threshold(),
        total_skill_points: Some(total),
        anchor: AnchorChange::Unchanged,
    }
}

/// All prerequisites unlocked (BigCheck prerequisite test)
fn prerequisites_unlocked(node: &Node, progress: &HashMap<NodeId, CourseProgress>) -> bool {
    node.unlock_dependencies_to.iter().all(|edge| {
        progress
            .get(&edge.from_node_id)
            .map(|row| row.unlocked)
            .unwrap_or(false)
    })
}

/// All prerequisites unlocked with at least one level invested
/// (Major/Minor prerequisite test)
fn prerequisites_leveled(node: &Node, progress: &HashMap<NodeId, CourseProgress>) -> bool {
    node.unlock_dependencies_to.iter().all(|edge| {
        progress
            .get(&edge.from_node_id)
            .map(|row| row.unlocked && row.level > 0)
            .unwrap_or(false)
    })
}

/// The time-based countdown state machine.
///
/// Once granted, a node is never re-locked; otherwise unsatisfied
/// prerequisites clear any running countdown, satisfied prerequisites start
/// one, and an elapsed countdown fires and clears its anchor.
fn evaluate_time_based(
    node: &Node,
    progress: &HashMap<NodeId, CourseProgress>,
    prerequisites_satisfied: bool,
    now: DateTime<Utc>,
) -> UnlockDecision {
    let row = progress.get(&node.id);

    // Already granted: short-circuit, anchor untouched
    if row.map(|r| r.unlocked).unwrap_or(false) {
        return UnlockDecision::stateless(node.id, true);
    }

    let anchor = row.and_then(|r| r.unlock_start_time);

    if !prerequisites_satisfied {
        return UnlockDecision {
            node_id: node.id,
            unlocked: false,
            total_skill_points: None,
            anchor: if anchor.is_some() {
                AnchorChange::Cleared
            } else {
                AnchorChange::Unchanged
            },
        };
    }

    // validate_config guarantees the interval is present
    let interval = node.unlock_dep_time_interval.unwrap_or(0);

    match anchor {
        None => UnlockDecision {
            node_id: node.id,
            unlocked: false,
            total_skill_points: None,
            anchor: AnchorChange::Set(now),
        },
        Some(started_at) => {
            let elapsed = now.signed_duration_since(started_at).num_seconds();
            if elapsed >= interval {
                UnlockDecision {
                    node_id: node.id,
                    unlocked: true,
                    total_skill_points: None,
                    anchor: AnchorChange::Cleared,
                }
            } else {
                UnlockDecision {
                    node_id: node.id,
                    unlocked: false,
                    total_skill_points: None,
                    anchor: AnchorChange::Unchanged,
                }
            }
        }
    }
}

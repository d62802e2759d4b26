use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use skilltree_store::{GraphStore, ProgressStore};
use skilltree_types::{
    events::ProgressionEvent, CourseId, CourseProgress, Node, NodeId, NodeKind, ProgressionError,
    ProgressionResult, UserId,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::evaluator::evaluate_node;
use crate::updater::{apply_decisions, UpdateSummary};
use crate::{AnchorChange, UnlockDecision};

/// The trigger surface of the progression engine.
///
/// Driven purely on demand: a time-based node only flips the next time
/// something calls [`ProgressionService::refresh_status`] after its interval
/// elapses. There is no background timer.
pub struct ProgressionService {
    /// Read-only skill-tree graph, shared across students
    graph: Arc<dyn GraphStore>,

    /// Per-student progress rows
    progress: Arc<dyn ProgressStore>,

    /// Channel for emitting progression events
    event_sender: Option<mpsc::Sender<ProgressionEvent>>,
}

impl ProgressionService {
    /// Create a new progression service
    pub fn new(graph: Arc<dyn GraphStore>, progress: Arc<dyn ProgressStore>) -> Self {
        Self {
            graph,
            progress,
            event_sender: None,
        }
    }

    /// Set a channel for emitting progression events
    pub fn with_events(mut self, sender: mpsc::Sender<ProgressionEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Recompute unlock status for one node, or for every node in the course
    /// when `node_id` is `None`.
    ///
    /// Misconfigured nodes are skipped with a warning and their rows left at
    /// the last-known-good state; one bad node never aborts its siblings.
    /// Callers re-fetch progress for the resulting states.
    pub async fn refresh_status(
        &self,
        user_id: UserId,
        course_id: CourseId,
        node_id: Option<NodeId>,
    ) -> ProgressionResult<UpdateSummary> {
        let nodes = self.graph.find_nodes_by_course(course_id).await?;
        let nodes_map: HashMap<NodeId, Node> = nodes.iter().map(|n| (n.id, n.clone())).collect();

        // One snapshot for the whole pass, so every node is judged against
        // the same state
        let rows = self.progress.find_progress(user_id, course_id).await?;
        let progress_map: HashMap<NodeId, CourseProgress> =
            rows.into_iter().map(|r| (r.node_id, r)).collect();

        let targets: Vec<&Node> = match node_id {
            Some(id) => {
                let node = nodes_map.get(&id).ok_or_else(|| {
                    ProgressionError::NotFound(format!(
                        "node {} does not exist in course {}",
                        id, course_id
                    ))
                })?;
                vec![node]
            }
            None => nodes.iter().collect(),
        };

        let now = Utc::now();
        let mut decisions = Vec::with_capacity(targets.len());
        for node in targets {
            match evaluate_node(node, &progress_map, &nodes_map, now) {
                Ok(decision) => decisions.push(decision),
                Err(ProgressionError::ConfigurationError(msg)) => {
                    warn!(
                        "Skipping node {} for user {}: {}",
                        node.id, user_id, msg
                    );
                }
                Err(e) => {
                    warn!(
                        "Evaluation failed for node {} user {}: {}",
                        node.id, user_id, e
                    );
                }
            }
        }

        let summary = apply_decisions(self.progress.as_ref(), user_id, &decisions).await;

        // Announce transitions only for rows that were actually written
        for decision in &decisions {
            if summary.applied.contains(&decision.node_id) {
                self.emit_transition_events(user_id, decision, &progress_map)
                    .await;
            }
        }

        debug!(
            "Refreshed status for user {} course {}: {} applied, {} failed",
            user_id,
            course_id,
            summary.applied.len(),
            summary.failed.len()
        );

        Ok(summary)
    }

    /// Provision progress rows for a student joining a course.
    ///
    /// One row per node; BigChecks start at level 1, the sentinel set of
    /// no-prerequisite BigChecks starts unlocked. A single refresh pass then
    /// settles everything reachable from that seed. Returns the number of
    /// rows created.
    pub async fn join_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> ProgressionResult<usize> {
        let nodes = self.graph.find_nodes_by_course(course_id).await?;
        if nodes.is_empty() {
            return Err(ProgressionError::NotFound(format!(
                "course {} has no nodes",
                course_id
            )));
        }

        let mut created = 0;
        for node in &nodes {
            let mut row = CourseProgress::seed(user_id, node);
            if node.kind == NodeKind::BigCheck && !node.has_prerequisites() {
                row.unlocked = true;
            }
            self.progress.insert_progress(row).await?;
            created += 1;
        }

        self.refresh_status(user_id, course_id, None).await?;

        info!(
            "User {} joined course {}: {} progress rows provisioned",
            user_id, course_id, created
        );
        self.emit(ProgressionEvent::CourseJoined { user_id, course_id })
            .await;

        Ok(created)
    }

    /// Destroy all of a student's progress for a course, returning the
    /// number of rows removed
    pub async fn reset_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> ProgressionResult<usize> {
        let removed = self.progress.delete_progress(user_id, course_id).await?;

        info!(
            "Reset progress for user {} course {}: {} rows removed",
            user_id, course_id, removed
        );
        self.emit(ProgressionEvent::ProgressReset { user_id, course_id })
            .await;

        Ok(removed)
    }

    /// Emit unlock/countdown events for one decision against the snapshot it
    /// was computed from
    async fn emit_transition_events(
        &self,
        user_id: UserId,
        decision: &UnlockDecision,
        snapshot: &HashMap<NodeId, CourseProgress>,
    ) {
        let was_unlocked = snapshot
            .get(&decision.node_id)
            .map(|r| r.unlocked)
            .unwrap_or(false);

        if decision.unlocked && !was_unlocked {
            self.emit(ProgressionEvent::NodeUnlocked {
                user_id,
                node_id: decision.node_id,
            })
            .await;
        } else if !decision.unlocked && was_unlocked {
            self.emit(ProgressionEvent::NodeRelocked {
                user_id,
                node_id: decision.node_id,
            })
            .await;
        }

        match decision.anchor {
            AnchorChange::Set(started_at) => {
                self.emit(ProgressionEvent::CountdownStarted {
                    user_id,
                    node_id: decision.node_id,
                    started_at,
                })
                .await;
            }
            AnchorChange::Cleared if !decision.unlocked => {
                self.emit(ProgressionEvent::CountdownCleared {
                    user_id,
                    node_id: decision.node_id,
                })
                .await;
            }
            _ => {}
        }
    }

    /// Best-effort event emission
    async fn emit(&self, event: ProgressionEvent) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                error!("Failed to send progression event: {}", e);
            }
        }
    }
}

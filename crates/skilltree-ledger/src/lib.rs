use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use skilltree_store::{AccountPatch, AccountStore, GraphStore, ProgressPatch, ProgressStore};
use skilltree_types::{
    events::ProgressionEvent, NodeId, ProgressionError, ProgressionResult, UserId, NO_MAX_LEVEL,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

/// Outcome of a successful level change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelChange {
    /// The node that was changed
    pub node_id: NodeId,

    /// Level before the change
    pub previous_level: i32,

    /// Level after the change
    pub new_level: i32,

    /// The student's remaining skill-point balance
    pub skill_pt_remaining: i64,
}

/// Applies student-initiated level changes, enforcing level bounds, the
/// per-node cooldown, and the skill-point balance.
///
/// The ledger never re-runs the unlock evaluator; callers trigger a separate
/// status refresh after a change.
pub struct SkillLedger {
    /// Read-only node definitions
    graph: Arc<dyn GraphStore>,

    /// Per-student progress rows
    progress: Arc<dyn ProgressStore>,

    /// Student point balances
    accounts: Arc<dyn AccountStore>,

    /// Channel for emitting progression events
    event_sender: Option<mpsc::Sender<ProgressionEvent>>,

    /// One lock per (user, node) row, so two simultaneous spends cannot
    /// both read the same starting level and balance
    row_locks: Mutex<HashMap<(UserId, NodeId), Arc<Mutex<()>>>>,
}

impl SkillLedger {
    /// Create a new ledger
    pub fn new(
        graph: Arc<dyn GraphStore>,
        progress: Arc<dyn ProgressStore>,
        accounts: Arc<dyn AccountStore>,
    ) -> Self {
        Self {
            graph,
            progress,
            accounts,
            event_sender: None,
            row_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The serialization lock for one (user, node) row
    async fn row_lock(&self, user_id: UserId, node_id: NodeId) -> Arc<Mutex<()>> {
        let mut locks = self.row_locks.lock().await;
        locks
            .entry((user_id, node_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Set a channel for emitting progression events
    pub fn with_events(mut self, sender: mpsc::Sender<ProgressionEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Apply a signed level delta to one node for one student.
    ///
    /// Positive deltas spend skill points and arm the cooldown; negative
    /// deltas refund nothing. Errors carry messages fit for direct display
    /// to the student.
    pub async fn change_level(
        &self,
        user_id: UserId,
        node_id: NodeId,
        delta: i32,
    ) -> ProgressionResult<LevelChange> {
        if delta == 0 {
            return Err(ProgressionError::InvalidOperation(
                "level delta must be non-zero".to_string(),
            ));
        }

        let node = self
            .graph
            .find_node(node_id)
            .await?
            .ok_or_else(|| ProgressionError::NotFound(format!("node {} does not exist", node_id)))?;

        if node.max_level == NO_MAX_LEVEL {
            return Err(ProgressionError::InvalidOperation(format!(
                "{} is a milestone and has no levels",
                node.name
            )));
        }

        // Hold the row lock across the whole read-check-write sequence so
        // concurrent requests for the same (user, node) are applied in order
        let lock = self.row_lock(user_id, node_id).await;
        let _guard = lock.lock().await;

        let row = self
            .progress
            .find_progress_row(user_id, node_id)
            .await?
            .ok_or_else(|| {
                ProgressionError::NotFound(format!(
                    "no progress for user {} on node {}",
                    user_id, node_id
                ))
            })?;

        let account = self.accounts.find_account(user_id).await?.ok_or_else(|| {
            ProgressionError::NotFound(format!("account for user {} does not exist", user_id))
        })?;

        // Widen before adding so an extreme delta cannot overflow i32
        let new_level = row.level as i64 + delta as i64;
        if new_level < 0 {
            return Err(ProgressionError::InvalidOperation(
                "cannot reduce level below 0".to_string(),
            ));
        }
        if new_level > node.max_level as i64 {
            return Err(ProgressionError::InvalidOperation(format!(
                "Max level of {} reached",
                node.max_level
            )));
        }
        let new_level = new_level as i32;

        let now = Utc::now();
        let mut remaining = account.skill_pt;

        if delta > 0 {
            if let Some(last) = row.last_upgrade_time {
                let since = now.signed_duration_since(last).num_seconds();
                if since < node.cool_down {
                    return Err(ProgressionError::InvalidOperation(format!(
                        "cooldown active: {}s of {}s remaining",
                        node.cool_down - since,
                        node.cool_down
                    )));
                }
            }

            let cost = delta as i64;
            if account.skill_pt < cost {
                return Err(ProgressionError::InsufficientResource(format!(
                    "{} skill points needed, {} available",
                    cost, account.skill_pt
                )));
            }

            remaining = account.skill_pt - cost;
            self.accounts
                .update_account(
                    user_id,
                    AccountPatch {
                        skill_pt: Some(remaining),
                        ..Default::default()
                    },
                )
                .await?;
        }

        // Leveling down refunds nothing; only the row changes
        self.progress
            .update_progress(
                user_id,
                node_id,
                ProgressPatch {
                    level: Some(new_level),
                    last_upgrade_time: if delta > 0 { Some(Some(now)) } else { None },
                    ..Default::default()
                },
            )
            .await?;

        info!(
            "User {} changed node {} level {} -> {} ({} skill points left)",
            user_id, node_id, row.level, new_level, remaining
        );
        self.emit(ProgressionEvent::LevelChanged {
            user_id,
            node_id,
            previous_level: row.level,
            new_level,
        })
        .await;

        Ok(LevelChange {
            node_id,
            previous_level: row.level,
            new_level,
            skill_pt_remaining: remaining,
        })
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

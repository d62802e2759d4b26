use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::lock::Mutex;
use skilltree_types::{
    CourseId, CourseProgress, Node, NodeId, ProgressionError, ProgressionResult, StudentAccount,
    UserId,
};

use crate::{AccountPatch, AccountStore, GraphStore, ProgressPatch, ProgressStore};

/// In-memory graph store holding teacher-authored node definitions
pub struct InMemoryGraphStore {
    /// Nodes by id, with dependency edges resolved inline
    nodes: Arc<Mutex<HashMap<NodeId, Node>>>,
}

impl InMemoryGraphStore {
    /// Create an empty graph store
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Insert or replace a node definition
    pub async fn put_node(&self, node: Node) {
        let mut nodes = self.nodes.lock().await;
        nodes.insert(node.id, node);
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn find_nodes_by_course(&self, course_id: CourseId) -> ProgressionResult<Vec<Node>> {
        let nodes = self.nodes.lock().await;
        let mut found: Vec<Node> = nodes
            .values()
            .filter(|n| n.course_id == course_id)
            .cloned()
            .collect();
        // Stable ordering keeps batch evaluation deterministic
        found.sort_by_key(|n| n.id);
        Ok(found)
    }

    async fn find_node(&self, node_id: NodeId) -> ProgressionResult<Option<Node>> {
        let nodes = self.nodes.lock().await;
        Ok(nodes.get(&node_id).cloned())
    }
}

/// In-memory progress store keyed by the unique (user, node) pair.
///
/// A single mutex serializes writes, so concurrent level-change requests for
/// the same row cannot interleave, and snapshot reads see one consistent
/// state.
pub struct InMemoryProgressStore {
    rows: Arc<Mutex<HashMap<(UserId, NodeId), CourseProgress>>>,
}

impl InMemoryProgressStore {
    /// Create an empty progress store
    pub fn new() -> Self {
        Self {
            rows: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn find_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> ProgressionResult<Vec<CourseProgress>> {
        let rows = self.rows.lock().await;
        let mut found: Vec<CourseProgress> = rows
            .values()
            .filter(|r| r.user_id == user_id && r.course_id == course_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.node_id);
        Ok(found)
    }

    async fn find_progress_row(
        &self,
        user_id: UserId,
        node_id: NodeId,
    ) -> ProgressionResult<Option<CourseProgress>> {
        let rows = self.rows.lock().await;
        Ok(rows.get(&(user_id, node_id)).cloned())
    }

    async fn insert_progress(&self, row: CourseProgress) -> ProgressionResult<()> {
        let mut rows = self.rows.lock().await;
        rows.insert((row.user_id, row.node_id), row);
        Ok(())
    }

    async fn update_progress(
        &self,
        user_id: UserId,
        node_id: NodeId,
        patch: ProgressPatch,
    ) -> ProgressionResult<()> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&(user_id, node_id)).ok_or_else(|| {
            ProgressionError::NotFound(format!(
                "progress row for user {} node {} does not exist",
                user_id, node_id
            ))
        })?;

        if let Some(unlocked) = patch.unlocked {
            row.unlocked = unlocked;
        }
        if let Some(level) = patch.level {
            row.level = level;
        }
        if let Some(cluster_skill_pt) = patch.cluster_skill_pt {
            row.cluster_skill_pt = cluster_skill_pt;
        }
        if let Some(unlock_start_time) = patch.unlock_start_time {
            row.unlock_start_time = unlock_start_time;
        }
        if let Some(last_upgrade_time) = patch.last_upgrade_time {
            row.last_upgrade_time = last_upgrade_time;
        }

        Ok(())
    }

    async fn delete_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> ProgressionResult<usize> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|_, r| !(r.user_id == user_id && r.course_id == course_id));
        Ok(before - rows.len())
    }
}

/// In-memory student account store
pub struct InMemoryAccountStore {
    accounts: Arc<Mutex<HashMap<UserId, StudentAccount>>>,
}

impl InMemoryAccountStore {
    /// Create an empty account store
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Insert or replace an account
    pub async fn put_account(&self, account: StudentAccount) {
        let mut accounts = self.accounts.lock().await;
        accounts.insert(account.user_id, account);
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_account(&self, user_id: UserId) -> ProgressionResult<Option<StudentAccount>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts.get(&user_id).cloned())
    }

    async fn update_account(
        &self,
        user_id: UserId,
        patch: AccountPatch,
    ) -> ProgressionResult<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts.get_mut(&user_id).ok_or_else(|| {
            ProgressionError::NotFound(format!("account for user {} does not exist", user_id))
        })?;

        if let Some(skill_pt) = patch.skill_pt {
            account.skill_pt = skill_pt;
        }
        if let Some(exp) = patch.exp {
            account.exp = exp;
        }
        if let Some(reward_pt) = patch.reward_pt {
            account.reward_pt = reward_pt;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skilltree_types::{NodeKind, UnlockType};

    fn test_node(id: NodeId, course_id: CourseId) -> Node {
        Node {
            id,
            course_id,
            kind: NodeKind::MinorNode,
            name: format!("node-{}", id),
            max_level: 5,
            unlock_type: UnlockType::SkillPoint,
            unlock_dep_time_interval: None,
            unlock_dep_cluster_total_skill_pt: None,
            cool_down: 0,
            exp: 0,
            reward_pt: 0,
            unlock_dependencies_to: vec![],
            lock_dependencies_to: vec![],
        }
    }

    #[tokio::test]
    async fn test_graph_store_course_filter() -> ProgressionResult<()> {
        let store = InMemoryGraphStore::new();
        store.put_node(test_node(1, 10)).await;
        store.put_node(test_node(2, 10)).await;
        store.put_node(test_node(3, 11)).await;

        let nodes = store.find_nodes_by_course(10).await?;
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id, 1);
        assert_eq!(nodes[1].id, 2);

        assert!(store.find_node(3).await?.is_some());
        assert!(store.find_node(99).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_progress_update_requires_existing_row() {
        let store = InMemoryProgressStore::new();

        let result = store
            .update_progress(1, 1, ProgressPatch::unlocked(true))
            .await;

        assert!(matches!(result, Err(ProgressionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_progress_patch_leaves_untouched_fields() -> ProgressionResult<()> {
        let store = InMemoryProgressStore::new();
        let node = test_node(7, 10);
        let mut row = CourseProgress::seed(1, &node);
        row.level = 2;
        store.insert_progress(row).await?;

        store
            .update_progress(1, 7, ProgressPatch::unlocked(true))
            .await?;

        let row = store.find_progress_row(1, 7).await?.unwrap();
        assert!(row.unlocked);
        assert_eq!(row.level, 2);

        // Some(None) clears the anchor, None leaves it alone
        let now = chrono::Utc::now();
        store
            .update_progress(
                1,
                7,
                ProgressPatch {
                    unlock_start_time: Some(Some(now)),
                    ..Default::default()
                },
            )
            .await?;
        let row = store.find_progress_row(1, 7).await?.unwrap();
        assert_eq!(row.unlock_start_time, Some(now));

        store
            .update_progress(
                1,
                7,
                ProgressPatch {
                    unlock_start_time: Some(None),
                    ..Default::default()
                },
            )
            .await?;
        let row = store.find_progress_row(1, 7).await?.unwrap();
        assert!(row.unlock_start_time.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_progress_cascades_per_course() -> ProgressionResult<()> {
        let store = InMemoryProgressStore::new();
        for id in 1..=3 {
            store
                .insert_progress(CourseProgress::seed(1, &test_node(id, 10)))
                .await?;
        }
        store
            .insert_progress(CourseProgress::seed(1, &test_node(4, 11)))
            .await?;

        let removed = store.delete_progress(1, 10).await?;
        assert_eq!(removed, 3);
        assert!(store.find_progress(1, 10).await?.is_empty());
        assert_eq!(store.find_progress(1, 11).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_account_store_roundtrip() -> ProgressionResult<()> {
        let store = InMemoryAccountStore::new();
        store
            .put_account(StudentAccount {
                user_id: 1,
                skill_pt: 5,
                exp: 0,
                reward_pt: 0,
            })
            .await;

        store
            .update_account(
                1,
                AccountPatch {
                    skill_pt: Some(2),
                    ..Default::default()
                },
            )
            .await?;

        let account = store.find_account(1).await?.unwrap();
        assert_eq!(account.skill_pt, 2);

        let missing = store
            .update_account(9, AccountPatch::default())
            .await;
        assert!(matches!(missing, Err(ProgressionError::NotFound(_))));

        Ok(())
    }
}

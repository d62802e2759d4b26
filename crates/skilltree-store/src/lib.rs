use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skilltree_types::{
    CourseId, CourseProgress, Node, NodeId, ProgressionResult, StudentAccount, UserId,
};

pub mod memory;

pub use memory::{InMemoryAccountStore, InMemoryGraphStore, InMemoryProgressStore};

/// Partial update of a progress row; `None` fields are left untouched.
///
/// The nested options on the timestamp fields distinguish "leave as is"
/// (`None`) from "set to null" (`Some(None)`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressPatch {
    pub unlocked: Option<bool>,
    pub level: Option<i32>,
    pub cluster_skill_pt: Option<i64>,
    pub unlock_start_time: Option<Option<DateTime<Utc>>>,
    pub last_upgrade_time: Option<Option<DateTime<Utc>>>,
}

impl ProgressPatch {
    /// A patch that only flips the unlocked flag
    pub fn unlocked(value: bool) -> Self {
        Self {
            unlocked: Some(value),
            ..Default::default()
        }
    }
}

/// Partial update of a student account; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountPatch {
    pub skill_pt: Option<i64>,
    pub exp: Option<i64>,
    pub reward_pt: Option<i64>,
}

/// Read contract over the teacher-authored skill-tree graph.
///
/// The graph is read-only from the engine's perspective; implementations may
/// safely cache and share nodes across concurrent evaluations for different
/// students.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// All nodes in a course, with dependency edges resolved
    async fn find_nodes_by_course(&self, course_id: CourseId) -> ProgressionResult<Vec<Node>>;

    /// A single node, or `None` when it does not exist
    async fn find_node(&self, node_id: NodeId) -> ProgressionResult<Option<Node>>;
}

/// Contract over the mutable per-(user, node) progress rows.
///
/// Rows are provisioned at course-join time and never lazily created;
/// `update_progress` fails with `NotFound` when the row is absent.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// One consistent snapshot of the student's rows for a course
    async fn find_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> ProgressionResult<Vec<CourseProgress>>;

    /// A single row keyed by the unique (user, node) pair
    async fn find_progress_row(
        &self,
        user_id: UserId,
        node_id: NodeId,
    ) -> ProgressionResult<Option<CourseProgress>>;

    /// Insert a freshly provisioned row
    async fn insert_progress(&self, row: CourseProgress) -> ProgressionResult<()>;

    /// Apply a partial update to one existing row
    async fn update_progress(
        &self,
        user_id: UserId,
        node_id: NodeId,
        patch: ProgressPatch,
    ) -> ProgressionResult<()>;

    /// Remove every row the student holds for a course, returning the count
    async fn delete_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> ProgressionResult<usize>;
}

/// Contract over student point balances
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// The student's account, or `None` when it does not exist
    async fn find_account(&self, user_id: UserId) -> ProgressionResult<Option<StudentAccount>>;

    /// Apply a partial update to one existing account
    async fn update_account(&self, user_id: UserId, patch: AccountPatch)
        -> ProgressionResult<()>;
}

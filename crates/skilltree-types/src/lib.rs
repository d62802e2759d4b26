use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod errors;

pub use errors::{ProgressionError, ProgressionResult};

/// Identifier of a node in a course's skill tree
pub type NodeId = i64;

/// Identifier of a student
pub type UserId = i64;

/// Identifier of a course
pub type CourseId = i64;

/// Sentinel `max_level` for nodes that carry no levels (BigChecks)
pub const NO_MAX_LEVEL: i32 = -1;

/// The three-tier hierarchy of skill-tree nodes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeKind {
    /// Top-level course milestone; carries unlock state but no levels
    BigCheck,

    /// Leveled skill node nested under a BigCheck
    MajorNode,

    /// Leveled skill node nested under a MajorNode
    MinorNode,
}

impl NodeKind {
    /// BigChecks gate clusters but never hold skill points themselves
    pub fn holds_skill_points(&self) -> bool {
        !matches!(self, NodeKind::BigCheck)
    }
}

/// Strategy the evaluator applies when deciding a node's unlocked state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnlockType {
    /// Unlocks as soon as every prerequisite is unlocked with level > 0
    SkillPoint,

    /// Unlocks after a countdown that starts when prerequisites are satisfied
    TimeBased,

    /// Unlocks when the aggregate cluster skill reaches a threshold
    ClusterTotalSkillPoint,
}

/// A directed unlock edge: `from` must be satisfied before `to` can unlock
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnlockDependency {
    /// The prerequisite node
    pub from_node_id: NodeId,

    /// The dependent node
    pub to_node_id: NodeId,
}

/// A directed lock edge between sibling nodes.
///
/// Lock semantics are a distinct feature; the unlock evaluator never
/// consults these edges.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockDependency {
    /// The node whose progress triggers the lock
    pub from_node_id: NodeId,

    /// The node that gets locked
    pub to_node_id: NodeId,
}

/// A teacher-authored node definition in a course's skill tree.
///
/// The dependency edge lists are resolved by the graph store at load time;
/// the evaluator reads them but never mutates the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier
    pub id: NodeId,

    /// Course this node belongs to
    pub course_id: CourseId,

    /// Position in the BigCheck / MajorNode / MinorNode hierarchy
    pub kind: NodeKind,

    /// Display name of the node
    pub name: String,

    /// Maximum level a student can reach; `NO_MAX_LEVEL` (-1) for BigChecks
    pub max_level: i32,

    /// Which unlock strategy the evaluator applies
    pub unlock_type: UnlockType,

    /// Countdown length in seconds; required when `unlock_type` is TimeBased
    pub unlock_dep_time_interval: Option<i64>,

    /// Cluster-skill threshold; missing means 0 (unlocks trivially)
    pub unlock_dep_cluster_total_skill_pt: Option<i64>,

    /// Minimum seconds between successive level-ups on this node
    pub cool_down: i64,

    /// Experience granted per level gained (consumed outside this core)
    pub exp: i64,

    /// Reward points granted per level gained (consumed outside this core)
    pub reward_pt: i64,

    /// Unlock edges where this node is the dependent `to` side
    pub unlock_dependencies_to: Vec<UnlockDependency>,

    /// Lock edges where this node is the `to` side (modeled, not evaluated)
    pub lock_dependencies_to: Vec<LockDependency>,
}

impl Node {
    /// True when the node has at least one unlock prerequisite
    pub fn has_prerequisites(&self) -> bool {
        !self.unlock_dependencies_to.is_empty()
    }

    /// Cluster threshold with the missing-value default applied
    pub fn cluster_threshold(&self) -> i64 {
        self.unlock_dep_cluster_total_skill_pt.unwrap_or(0)
    }
}

/// Mutable per-(user, node) progress state.
///
/// One row exists per node in every course the student has joined; rows are
/// provisioned at join time and deleted only on an explicit course reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseProgress {
    /// The student this row belongs to
    pub user_id: UserId,

    /// The node this row tracks
    pub node_id: NodeId,

    /// Course the node belongs to, for cascade deletes
    pub course_id: CourseId,

    /// Ground truth computed by the unlock evaluator
    pub unlocked: bool,

    /// Current level, 0..=max_level (BigChecks conventionally sit at 1)
    pub level: i32,

    /// Cached aggregate used for cluster-threshold unlocks
    pub cluster_skill_pt: i64,

    /// Anchor of an in-flight time-based countdown; null when not counting
    pub unlock_start_time: Option<DateTime<Utc>>,

    /// When the student last raised this node's level, for cooldown checks
    pub last_upgrade_time: Option<DateTime<Utc>>,
}

impl CourseProgress {
    /// A freshly provisioned row for a node the student has not touched
    pub fn seed(user_id: UserId, node: &Node) -> Self {
        Self {
            user_id,
            node_id: node.id,
            course_id: node.course_id,
            unlocked: false,
            level: if node.kind == NodeKind::BigCheck { 1 } else { 0 },
            cluster_skill_pt: 0,
            unlock_start_time: None,
            last_upgrade_time: None,
        }
    }
}

/// A student's point balances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentAccount {
    /// The student
    pub user_id: UserId,

    /// Unspent skill points available for leveling up nodes
    pub skill_pt: i64,

    /// Accumulated experience
    pub exp: i64,

    /// Accumulated reward points
    pub reward_pt: i64,
}

/// Events emitted by the progression engine and ledger
pub mod events {
    use super::*;

    /// Best-effort notifications about progression state changes
    #[derive(Debug, Clone)]
    pub enum ProgressionEvent {
        /// A node's unlocked flag flipped to true
        NodeUnlocked { user_id: UserId, node_id: NodeId },

        /// A previously unlocked node was re-locked by a stateless recompute
        NodeRelocked { user_id: UserId, node_id: NodeId },

        /// A time-based countdown anchor was set
        CountdownStarted {
            user_id: UserId,
            node_id: NodeId,
            started_at: DateTime<Utc>,
        },

        /// A countdown anchor was cleared without unlocking
        CountdownCleared { user_id: UserId, node_id: NodeId },

        /// A student changed a node's level through the ledger
        LevelChanged {
            user_id: UserId,
            node_id: NodeId,
            previous_level: i32,
            new_level: i32,
        },

        /// A student joined a course and rows were provisioned
        CourseJoined { user_id: UserId, course_id: CourseId },

        /// A student's course progress was destroyed
        ProgressReset { user_id: UserId, course_id: CourseId },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minor_node(id: NodeId) -> Node {
        Node {
            id,
            course_id: 1,
            kind: NodeKind::MinorNode,
            name: format!("minor-{}", id),
            max_level: 3,
            unlock_type: UnlockType::SkillPoint,
            unlock_dep_time_interval: None,
            unlock_dep_cluster_total_skill_pt: None,
            cool_down: 0,
            exp: 10,
            reward_pt: 2,
            unlock_dependencies_to: vec![],
            lock_dependencies_to: vec![],
        }
    }

    #[test]
    fn test_node_serialization() {
        let mut node = minor_node(7);
        node.unlock_dependencies_to.push(UnlockDependency {
            from_node_id: 3,
            to_node_id: 7,
        });

        let json = serde_json::to_string(&node).unwrap();
        let deserialized: Node = serde_json::from_str(&json).unwrap();

        assert_eq!(node.id, deserialized.id);
        assert_eq!(node.kind, deserialized.kind);
        assert_eq!(
            node.unlock_dependencies_to,
            deserialized.unlock_dependencies_to
        );
    }

    #[test]
    fn test_seed_levels_by_kind() {
        let minor = minor_node(1);
        let row = CourseProgress::seed(42, &minor);
        assert_eq!(row.level, 0);
        assert!(!row.unlocked);
        assert!(row.unlock_start_time.is_none());

        let mut big = minor_node(2);
        big.kind = NodeKind::BigCheck;
        big.max_level = NO_MAX_LEVEL;
        let row = CourseProgress::seed(42, &big);
        assert_eq!(row.level, 1);
    }

    #[test]
    fn test_cluster_threshold_default() {
        let mut node = minor_node(1);
        assert_eq!(node.cluster_threshold(), 0);
        node.unlock_dep_cluster_total_skill_pt = Some(5);
        assert_eq!(node.cluster_threshold(), 5);
    }
}

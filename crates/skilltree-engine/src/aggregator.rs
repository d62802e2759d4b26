use std::collections::{HashMap, HashSet};

use skilltree_types::{CourseProgress, Node, NodeId};

/// Forward adjacency over the unlock graph, derived from the resolved
/// `unlock_dependencies_to` lists of every node in the course.
///
/// Maps a prerequisite node to the dependents it unlocks.
pub fn build_adjacency(nodes: &HashMap<NodeId, Node>) -> HashMap<NodeId, Vec<NodeId>> {
    let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

    for node in nodes.values() {
        for edge in &node.unlock_dependencies_to {
            adjacency
                .entry(edge.from_node_id)
                .or_default()
                .push(edge.to_node_id);
        }
    }

    // Stable child order keeps aggregation deterministic
    for children in adjacency.values_mut() {
        children.sort_unstable();
        children.dedup();
    }

    adjacency
}

/// Total skill invested in the subtree reachable forward from `node_id`.
///
/// A node's own contribution is its progress level; BigChecks and missing
/// nodes contribute 0 but are still traversed. The visited set is threaded
/// through the recursion so a cyclic graph returns the partial sum computed
/// before the revisit instead of recursing forever.
pub fn aggregate_skill(
    node_id: NodeId,
    nodes: &HashMap<NodeId, Node>,
    progress: &HashMap<NodeId, CourseProgress>,
    adjacency: &HashMap<NodeId, Vec<NodeId>>,
    visited: &mut HashSet<NodeId>,
) -> i64 {
    if !visited.insert(node_id) {
        return 0;
    }

    let own = match nodes.get(&node_id) {
        Some(node) if node.kind.holds_skill_points() => progress
            .get(&node_id)
            .map(|row| row.level as i64)
            .unwrap_or(0),
        _ => 0,
    };

    let children = adjacency
        .get(&node_id)
        .map(|c| c.as_slice())
        .unwrap_or(&[]);

    own + children
        .iter()
        .map(|child| aggregate_skill(*child, nodes, progress, adjacency, visited))
        .sum::<i64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use skilltree_types::{NodeKind, UnlockDependency, UnlockType, NO_MAX_LEVEL};

    fn node(id: NodeId, kind: NodeKind) -> Node {
        Node {
            id,
            course_id: 1,
            kind,
            name: format!("node-{}", id),
            max_level: if kind == NodeKind::BigCheck { NO_MAX_LEVEL } else { 5 },
            unlock_type: match kind {
                NodeKind::BigCheck => UnlockType::ClusterTotalSkillPoint,
                _ => UnlockType::SkillPoint,
            },
            unlock_dep_time_interval: None,
            unlock_dep_cluster_total_skill_pt: None,
            cool_down: 0,
            exp: 0,
            reward_pt: 0,
            unlock_dependencies_to: vec![],
            lock_dependencies_to: vec![],
        }
    }

    fn link(nodes: &mut HashMap<NodeId, Node>, from: NodeId, to: NodeId) {
        nodes
            .get_mut(&to)
            .unwrap()
            .unlock_dependencies_to
            .push(UnlockDependency {
                from_node_id: from,
                to_node_id: to,
            });
    }

    fn progress_with_level(user: i64, n: &Node, level: i32) -> CourseProgress {
        let mut row = CourseProgress::seed(user, n);
        row.level = level;
        row
    }

    fn setup_chain() -> (HashMap<NodeId, Node>, HashMap<NodeId, CourseProgress>) {
        // BigCheck(1) -> Major(2, level 2) -> Minor(3, level 3)
        let mut nodes = HashMap::new();
        nodes.insert(1, node(1, NodeKind::BigCheck));
        nodes.insert(2, node(2, NodeKind::MajorNode));
        nodes.insert(3, node(3, NodeKind::MinorNode));
        link(&mut nodes, 1, 2);
        link(&mut nodes, 2, 3);

        let mut progress = HashMap::new();
        progress.insert(2, progress_with_level(1, &nodes[&2], 2));
        progress.insert(3, progress_with_level(1, &nodes[&3], 3));

        (nodes, progress)
    }

    #[test]
    fn test_bigcheck_contributes_zero_but_is_traversed() {
        let (nodes, progress) = setup_chain();
        let adjacency = build_adjacency(&nodes);

        let mut visited = HashSet::new();
        let from_major = aggregate_skill(2, &nodes, &progress, &adjacency, &mut visited);
        assert_eq!(from_major, 5);

        let mut visited = HashSet::new();
        let from_bigcheck = aggregate_skill(1, &nodes, &progress, &adjacency, &mut visited);
        assert_eq!(from_bigcheck, from_major);
    }

    #[test]
    fn test_missing_progress_rows_count_as_zero() {
        let (nodes, _) = setup_chain();
        let adjacency = build_adjacency(&nodes);
        let progress = HashMap::new();

        let mut visited = HashSet::new();
        assert_eq!(aggregate_skill(1, &nodes, &progress, &adjacency, &mut visited), 0);
    }

    #[test]
    fn test_unknown_node_is_zero() {
        let (nodes, progress) = setup_chain();
        let adjacency = build_adjacency(&nodes);

        let mut visited = HashSet::new();
        assert_eq!(aggregate_skill(99, &nodes, &progress, &adjacency, &mut visited), 0);
    }

    #[test]
    fn test_cycle_terminates_with_partial_sum() {
        // 2 -> 3 -> 2 loop, plus the entry edge 1 -> 2
        let (mut nodes, progress) = setup_chain();
        link(&mut nodes, 3, 2);
        let adjacency = build_adjacency(&nodes);

        let mut visited = HashSet::new();
        let total = aggregate_skill(2, &nodes, &progress, &adjacency, &mut visited);
        // Each node counted once despite the loop
        assert_eq!(total, 5);
    }
}

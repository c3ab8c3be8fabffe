//! Pure readiness evaluation.
//!
//! These functions are side-effect-free and deterministic; the scheduler
//! re-runs them after every node completion to discover newly unblocked
//! nodes (cascading activation). The order of the returned ids carries no
//! meaning: nodes that are ready together start in the same pass.

use crate::graph::{Graph, NodeState};
use std::collections::{HashMap, HashSet};

/// A node may start iff it is still idle and every dependency has
/// completed. Nodes with no dependencies are vacuously ready.
pub fn is_ready(
    graph: &Graph,
    node_id: &str,
    states: &HashMap<String, NodeState>,
    completed: &HashSet<String>,
) -> bool {
    if states.get(node_id) != Some(&NodeState::Idle) {
        return false;
    }
    graph
        .dependencies_of(node_id)
        .iter()
        .all(|dep| completed.contains(dep))
}

/// All idle nodes, not already processing, whose dependencies are met.
pub fn find_ready(
    graph: &Graph,
    states: &HashMap<String, NodeState>,
    completed: &HashSet<String>,
    processing: &HashSet<String>,
) -> Vec<String> {
    graph
        .node_ids()
        .iter()
        .filter(|id| {
            !processing.contains(id.as_str()) && is_ready(graph, id.as_str(), states, completed)
        })
        .cloned()
        .collect()
}

use crate::graph::{Graph, NodeState};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One run (or replay) of a graph under a specific instance id.
///
/// All mutable simulation state lives here, owned by a single value: the
/// per-node state map, the completed and processing sets, and the
/// completion-fired latch. The scheduler is the only mutator, and it holds
/// this behind a mutex, so every transition happens in one critical
/// section.
///
/// Invariants:
/// - `completed` and `processing` are disjoint.
/// - a node enters `processing` only when all its dependencies are in
///   `completed` (enforced by the readiness check at activation).
/// - `completion_fired` goes `false -> true` at most once per run; only
///   `reset` clears it.
#[derive(Debug)]
pub struct WorkflowInstance {
    instance_id: String,
    graph: Arc<Graph>,
    states: HashMap<String, NodeState>,
    completed: HashSet<String>,
    processing: HashSet<String>,
    completion_fired: bool,
    run: u64,
}

impl WorkflowInstance {
    pub fn new(graph: Arc<Graph>, instance_id: impl Into<String>) -> Self {
        let states = graph
            .node_ids()
            .iter()
            .map(|id| (id.clone(), NodeState::Idle))
            .collect();
        Self {
            instance_id: instance_id.into(),
            graph,
            states,
            completed: HashSet::new(),
            processing: HashSet::new(),
            completion_fired: false,
            run: 0,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn state_of(&self, node_id: &str) -> Option<NodeState> {
        self.states.get(node_id).copied()
    }

    pub fn states(&self) -> &HashMap<String, NodeState> {
        &self.states
    }

    pub fn completed(&self) -> &HashSet<String> {
        &self.completed
    }

    pub fn processing(&self) -> &HashSet<String> {
        &self.processing
    }

    pub fn completion_fired(&self) -> bool {
        self.completion_fired
    }

    /// Current run number. Bumped by every `reset`; timer messages carry
    /// the run they were scheduled under so stale ones can be discarded.
    pub fn run(&self) -> u64 {
        self.run
    }

    pub fn is_stale(&self, run: u64) -> bool {
        run != self.run
    }

    /// `idle -> processing`. Returns false if the node is unknown or not
    /// idle; the caller has already established readiness.
    pub(crate) fn begin_processing(&mut self, node_id: &str) -> bool {
        match self.states.get_mut(node_id) {
            Some(state @ NodeState::Idle) => {
                *state = NodeState::Processing;
                self.processing.insert(node_id.to_string());
                true
            }
            _ => false,
        }
    }

    /// `processing -> completed`. Completed nodes are never revisited.
    pub(crate) fn finish(&mut self, node_id: &str) -> bool {
        match self.states.get_mut(node_id) {
            Some(state @ NodeState::Processing) => {
                *state = NodeState::Completed;
                self.processing.remove(node_id);
                self.completed.insert(node_id.to_string());
                true
            }
            _ => false,
        }
    }

    /// `processing -> error`. The node leaves the processing set without
    /// joining the completed set, so its dependents stay blocked and the
    /// workflow can no longer complete.
    pub(crate) fn fail(&mut self, node_id: &str) -> bool {
        match self.states.get_mut(node_id) {
            Some(state @ NodeState::Processing) => {
                *state = NodeState::Error;
                self.processing.remove(node_id);
                true
            }
            _ => false,
        }
    }

    /// Completion guard: returns true, and latches `completion_fired`, iff
    /// every node has completed, nothing is processing, the graph is
    /// non-empty, and the latch was not already set. Check and set are one
    /// step under the scheduler's lock, so two racing completion handlers
    /// cannot both observe false.
    pub(crate) fn try_fire_completion(&mut self) -> bool {
        let complete = self.completed.len() == self.graph.len()
            && self.processing.is_empty()
            && self.graph.len() > 0
            && !self.completion_fired;
        if complete {
            self.completion_fired = true;
        }
        complete
    }

    /// Rebuild terminal state from the persistence store: every node
    /// completed and the latch set, with no simulation having run.
    pub(crate) fn restore_completed(&mut self) {
        self.processing.clear();
        self.completed.clear();
        for id in self.graph.node_ids() {
            self.states.insert(id.clone(), NodeState::Completed);
            self.completed.insert(id.clone());
        }
        self.completion_fired = true;
    }

    /// Return every node to idle, clear both sets and the latch, and bump
    /// the run number so in-flight timer messages become stale.
    pub(crate) fn reset(&mut self) -> u64 {
        self.run += 1;
        self.completed.clear();
        self.processing.clear();
        self.completion_fired = false;
        for state in self.states.values_mut() {
            *state = NodeState::Idle;
        }
        self.run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeSpec, NodeSpec};

    fn instance() -> WorkflowInstance {
        let graph = Graph::new(
            vec![NodeSpec::new("A", 1.0), NodeSpec::new("B", 1.0)],
            vec![EdgeSpec::new("A", "B")],
        )
        .unwrap();
        WorkflowInstance::new(Arc::new(graph), "inst-1")
    }

    #[test]
    fn test_new_instance_is_all_idle() {
        let inst = instance();
        assert_eq!(inst.state_of("A"), Some(NodeState::Idle));
        assert_eq!(inst.state_of("B"), Some(NodeState::Idle));
        assert!(inst.completed().is_empty());
        assert!(inst.processing().is_empty());
        assert!(!inst.completion_fired());
    }

    #[test]
    fn test_sets_stay_disjoint_through_transitions() {
        let mut inst = instance();
        assert!(inst.begin_processing("A"));
        assert!(inst.processing().contains("A"));
        assert!(!inst.completed().contains("A"));

        assert!(inst.finish("A"));
        assert!(!inst.processing().contains("A"));
        assert!(inst.completed().contains("A"));
        assert_eq!(inst.state_of("A"), Some(NodeState::Completed));
    }

    #[test]
    fn test_transitions_are_forward_only() {
        let mut inst = instance();
        // finish without processing
        assert!(!inst.finish("A"));
        assert!(inst.begin_processing("A"));
        // double activation
        assert!(!inst.begin_processing("A"));
        assert!(inst.finish("A"));
        // completed nodes are never revisited
        assert!(!inst.begin_processing("A"));
        assert!(!inst.finish("A"));
        assert!(!inst.fail("A"));
    }

    #[test]
    fn test_completion_guard_fires_once() {
        let mut inst = instance();
        inst.begin_processing("A");
        inst.finish("A");
        assert!(!inst.try_fire_completion());

        inst.begin_processing("B");
        assert!(!inst.try_fire_completion());

        inst.finish("B");
        assert!(inst.try_fire_completion());
        assert!(inst.completion_fired());
        // a second racing check observes the latch
        assert!(!inst.try_fire_completion());
    }

    #[test]
    fn test_failed_node_blocks_completion() {
        let mut inst = instance();
        inst.begin_processing("A");
        assert!(inst.fail("A"));
        assert_eq!(inst.state_of("A"), Some(NodeState::Error));
        assert!(inst.processing().is_empty());
        assert!(!inst.try_fire_completion());
    }

    #[test]
    fn test_reset_clears_everything_and_bumps_run() {
        let mut inst = instance();
        inst.begin_processing("A");
        inst.finish("A");
        inst.begin_processing("B");
        inst.finish("B");
        assert!(inst.try_fire_completion());

        let old_run = inst.run();
        let new_run = inst.reset();
        assert_eq!(new_run, old_run + 1);
        assert!(inst.is_stale(old_run));
        assert!(!inst.completion_fired());
        assert!(inst.completed().is_empty());
        assert!(inst.processing().is_empty());
        assert_eq!(inst.state_of("A"), Some(NodeState::Idle));
        assert_eq!(inst.state_of("B"), Some(NodeState::Idle));
    }

    #[test]
    fn test_restore_completed_latches_without_running() {
        let mut inst = instance();
        inst.restore_completed();
        assert!(inst.completion_fired());
        assert_eq!(inst.completed().len(), 2);
        assert!(inst.processing().is_empty());
        assert_eq!(inst.state_of("B"), Some(NodeState::Completed));
        // the latch means a later guard check cannot re-fire
        assert!(!inst.try_fire_completion());
    }
}

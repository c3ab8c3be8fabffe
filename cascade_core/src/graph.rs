use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph has no nodes")]
    Empty,

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("edge {from} -> {target} references unknown node: {unknown}")]
    UnknownNode {
        // Named `from` rather than `source` because thiserror treats a
        // `source` field as the error's source, which must impl Error.
        from: String,
        target: String,
        unknown: String,
    },

    #[error("dependency cycle among nodes: {0:?}")]
    Cycle(Vec<String>),

    #[error("negative duration on node: {0}")]
    NegativeDuration(String),
}

/// Processing lifecycle of a single task node.
///
/// The happy path is `idle -> processing -> completed`. A `processing` node
/// may instead be failed to `error` by the host; nothing leaves `completed`
/// or `error` except a full instance reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Idle,
    Processing,
    Completed,
    Error,
}

/// Static description of one task node.
///
/// `metadata` carries display-only payload (descriptions, metrics, schemas)
/// that the engine never inspects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub duration_secs: f64,
    #[serde(default)]
    pub metadata: Value,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            id: id.into(),
            label: None,
            description: None,
            duration_secs,
            metadata: Value::Null,
        }
    }
}

/// A directed edge; its existence makes `source` a dependency of `target`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
}

impl EdgeSpec {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Immutable task graph with precomputed dependency lookups.
///
/// Construction validates the configuration: duplicate ids, edges to
/// unknown nodes, an empty node set, and dependency cycles are all rejected
/// up front. An undetected cycle would stall the simulation forever, so it
/// is treated as a configuration error rather than a runtime condition.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: HashMap<String, NodeSpec>,
    order: Vec<String>,
    edges: Vec<EdgeSpec>,
    dependencies: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
}

impl Graph {
    pub fn new(nodes: Vec<NodeSpec>, edges: Vec<EdgeSpec>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut node_map = HashMap::with_capacity(nodes.len());
        let mut order = Vec::with_capacity(nodes.len());
        for node in nodes {
            if node.duration_secs < 0.0 {
                return Err(GraphError::NegativeDuration(node.id));
            }
            if node_map.contains_key(&node.id) {
                return Err(GraphError::DuplicateNode(node.id));
            }
            order.push(node.id.clone());
            node_map.insert(node.id.clone(), node);
        }

        let mut dependencies: HashMap<String, Vec<String>> =
            order.iter().map(|id| (id.clone(), Vec::new())).collect();
        let mut dependents: HashMap<String, Vec<String>> =
            order.iter().map(|id| (id.clone(), Vec::new())).collect();

        for edge in &edges {
            for endpoint in [&edge.source, &edge.target] {
                if !node_map.contains_key(endpoint) {
                    return Err(GraphError::UnknownNode {
                        from: edge.source.clone(),
                        target: edge.target.clone(),
                        unknown: endpoint.clone(),
                    });
                }
            }
            if let Some(deps) = dependencies.get_mut(&edge.target) {
                deps.push(edge.source.clone());
            }
            if let Some(deps) = dependents.get_mut(&edge.source) {
                deps.push(edge.target.clone());
            }
        }

        let graph = Self {
            nodes: node_map,
            order,
            edges,
            dependencies,
            dependents,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Kahn's algorithm; any node left with unmet in-degree is on a cycle.
    fn check_acyclic(&self) -> Result<()> {
        let mut indegree: HashMap<&str, usize> = self
            .order
            .iter()
            .map(|id| (id.as_str(), self.dependencies_of(id).len()))
            .collect();

        let mut queue: VecDeque<&str> = indegree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut visited = 0usize;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            for dependent in self.dependents_of(id) {
                if let Some(deg) = indegree.get_mut(dependent.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }

        if visited == self.order.len() {
            Ok(())
        } else {
            let mut stuck: Vec<String> = indegree
                .into_iter()
                .filter(|(_, deg)| *deg > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            stuck.sort();
            Err(GraphError::Cycle(stuck))
        }
    }

    /// Ids of the nodes that must complete before `node_id` may start.
    pub fn dependencies_of(&self, node_id: &str) -> &[String] {
        self.dependencies
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Ids of the nodes unblocked (in part) by `node_id` completing.
    pub fn dependents_of(&self, node_id: &str) -> &[String] {
        self.dependents
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeSpec> {
        self.nodes.get(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Node ids in configuration order. Execution never depends on this
    /// order; it exists for display.
    pub fn node_ids(&self) -> &[String] {
        &self.order
    }

    pub fn edges(&self) -> &[EdgeSpec] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn duration_of(&self, node_id: &str) -> Option<Duration> {
        self.nodes
            .get(node_id)
            .map(|n| Duration::from_secs_f64(n.duration_secs))
    }
}

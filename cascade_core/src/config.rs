use crate::graph::{self, EdgeSpec, Graph, NodeSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
}

// Matches the fallback the renderer applied when a node carried no
// explicit processing time.
fn default_duration() -> f64 {
    3.0
}

/// One task node as written in a workflow-configuration file. Unknown
/// keys are ignored so configs can carry renderer-only fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_duration")]
    pub duration_secs: f64,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub source: String,
    pub target: String,
}

/// Declarative graph configuration, loadable from TOML or JSON.
///
/// Building funnels through [`Graph::new`], so every structural check
/// (unknown edge endpoints, duplicates, cycles, empty graphs) applies to
/// loaded configs before an instance exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
}

impl GraphConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("loading graph config from {:?}", path);
        let text = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("json") => Self::from_json_str(&text),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("none").to_string(),
            )),
        }
    }

    /// Divide every duration by `factor`, for faster or slower playback.
    /// Values <= 0 leave the config unchanged.
    pub fn with_speed(mut self, factor: f64) -> Self {
        if factor > 0.0 {
            for node in &mut self.nodes {
                node.duration_secs /= factor;
            }
        }
        self
    }

    pub fn build(&self) -> graph::Result<Graph> {
        let nodes = self
            .nodes
            .iter()
            .map(|n| NodeSpec {
                id: n.id.clone(),
                label: n.label.clone(),
                description: n.description.clone(),
                duration_secs: n.duration_secs,
                metadata: n.metadata.clone(),
            })
            .collect();
        let edges = self
            .edges
            .iter()
            .map(|e| EdgeSpec::new(&e.source, &e.target))
            .collect();
        Graph::new(nodes, edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphError;

    const CHAIN_TOML: &str = r#"
name = "chain"

[[nodes]]
id = "A"
label = "Parse Query"
duration_secs = 1.0

[[nodes]]
id = "B"

[[edges]]
source = "A"
target = "B"
"#;

    #[test]
    fn test_parse_toml_config() {
        let config = GraphConfig::from_toml_str(CHAIN_TOML).unwrap();
        assert_eq!(config.name.as_deref(), Some("chain"));
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[0].label.as_deref(), Some("Parse Query"));
        // missing duration falls back to the renderer default
        assert_eq!(config.nodes[1].duration_secs, 3.0);

        let graph = config.build().unwrap();
        assert_eq!(graph.dependencies_of("B"), ["A"]);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config = GraphConfig::from_json_str(
            r##"{
                "name": "x",
                "future_field": true,
                "nodes": [
                    {"id": "A", "duration_secs": 1.0, "color": "#2c5282"}
                ],
                "edges": []
            }"##,
        )
        .unwrap();
        assert_eq!(config.nodes[0].id, "A");
    }

    #[test]
    fn test_build_rejects_bad_references() {
        let config = GraphConfig::from_json_str(
            r#"{
                "nodes": [{"id": "A"}],
                "edges": [{"source": "A", "target": "ghost"}]
            }"#,
        )
        .unwrap();
        assert!(matches!(
            config.build(),
            Err(GraphError::UnknownNode { .. })
        ));
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(matches!(
            GraphConfig::from_toml_str("nodes = 3"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_with_speed_scales_durations() {
        let config = GraphConfig::from_toml_str(CHAIN_TOML)
            .unwrap()
            .with_speed(2.0);
        assert_eq!(config.nodes[0].duration_secs, 0.5);

        // non-positive factor is a no-op
        let config = GraphConfig::from_toml_str(CHAIN_TOML)
            .unwrap()
            .with_speed(0.0);
        assert_eq!(config.nodes[0].duration_secs, 1.0);
    }

    #[test]
    fn test_from_path_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("wf.toml");
        std::fs::write(&toml_path, CHAIN_TOML).unwrap();
        assert!(GraphConfig::from_path(&toml_path).is_ok());

        let other = dir.path().join("wf.yaml");
        std::fs::write(&other, "x").unwrap();
        assert!(matches!(
            GraphConfig::from_path(&other),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "yaml"
        ));
    }
}

//! Mapping from a workflow classification tag to a graph configuration.
//!
//! The host classifies a user prompt into a "kind" and resolves it here;
//! the scheduler itself never sees kinds. The built-in catalog ships a few
//! stock pipelines so the CLI can run without external config files.

use crate::config::{EdgeConfig, GraphConfig, NodeConfig};
use lazy_static::lazy_static;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct WorkflowCatalog {
    configs: HashMap<String, GraphConfig>,
}

impl WorkflowCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with the built-in workflow kinds.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    pub fn register(&mut self, kind: impl Into<String>, config: GraphConfig) {
        self.configs.insert(kind.into(), config);
    }

    pub fn resolve(&self, kind: &str) -> Option<&GraphConfig> {
        self.configs.get(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.configs.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

fn node(id: &str, label: &str, duration_secs: f64) -> NodeConfig {
    NodeConfig {
        id: id.to_string(),
        label: Some(label.to_string()),
        description: None,
        duration_secs,
        metadata: Value::Null,
    }
}

fn edge(source: &str, target: &str) -> EdgeConfig {
    EdgeConfig {
        source: source.to_string(),
        target: target.to_string(),
    }
}

lazy_static! {
    static ref BUILTIN: WorkflowCatalog = {
        let mut catalog = WorkflowCatalog::new();

        catalog.register(
            "outbreak-response",
            GraphConfig {
                name: Some("Outbreak Response Briefing".to_string()),
                nodes: vec![
                    node("parse_query", "Parse User Query", 2.0),
                    node("fetch_case_data", "Fetch Case Data", 3.0),
                    node("detect_clusters", "Detect Case Clusters", 4.0),
                    node("trend_analysis", "Analyze Trends", 3.0),
                    node("draft_briefing", "Draft Briefing", 2.0),
                    node("render_report", "Render Report", 1.0),
                ],
                edges: vec![
                    edge("parse_query", "fetch_case_data"),
                    edge("fetch_case_data", "detect_clusters"),
                    edge("fetch_case_data", "trend_analysis"),
                    edge("detect_clusters", "draft_briefing"),
                    edge("trend_analysis", "draft_briefing"),
                    edge("draft_briefing", "render_report"),
                ],
            },
        );

        catalog.register(
            "fleet-telemetry",
            GraphConfig {
                name: Some("Fleet Telemetry Rollup".to_string()),
                nodes: vec![
                    node("parse_query", "Parse User Query", 1.0),
                    node("ingest_telemetry", "Ingest Telemetry", 3.0),
                    node("route_analysis", "Analyze Routes", 3.0),
                    node("fuel_analysis", "Analyze Fuel Usage", 2.0),
                    node("maintenance_flags", "Flag Maintenance", 2.0),
                    node("fleet_summary", "Summarize Fleet Health", 2.0),
                ],
                edges: vec![
                    edge("parse_query", "ingest_telemetry"),
                    edge("ingest_telemetry", "route_analysis"),
                    edge("ingest_telemetry", "fuel_analysis"),
                    edge("ingest_telemetry", "maintenance_flags"),
                    edge("route_analysis", "fleet_summary"),
                    edge("fuel_analysis", "fleet_summary"),
                    edge("maintenance_flags", "fleet_summary"),
                ],
            },
        );

        catalog.register(
            "campaign-briefing",
            GraphConfig {
                name: Some("Campaign Briefing".to_string()),
                nodes: vec![
                    node("parse_query", "Parse User Query", 1.0),
                    node("audience_segments", "Segment Audience", 3.0),
                    node("inventory_check", "Check Inventory", 2.0),
                    node("draft_campaign", "Draft Campaign", 3.0),
                ],
                edges: vec![
                    edge("parse_query", "audience_segments"),
                    edge("parse_query", "inventory_check"),
                    edge("audience_segments", "draft_campaign"),
                    edge("inventory_check", "draft_campaign"),
                ],
            },
        );

        catalog
    };
}

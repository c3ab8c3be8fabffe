use crate::events::WorkflowEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub event: WorkflowEvent,
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:?}", self.timestamp, self.event)
    }
}

/// Append-only in-memory history of everything the engine emitted.
#[derive(Debug, Clone)]
pub struct EventLog {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn append(&self, event: WorkflowEvent) {
        let record = EventRecord {
            timestamp: Utc::now(),
            event,
        };
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    pub fn all(&self) -> Vec<EventRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> EventStats {
        EventStats::from_records(&self.all())
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-kind event counts, used for run summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    pub node_transitions: usize,
    pub completions: usize,
    pub resets: usize,
}

impl EventStats {
    pub fn from_records(records: &[EventRecord]) -> Self {
        let mut stats = EventStats::default();
        for record in records {
            match record.event {
                WorkflowEvent::NodeStateChanged { .. } => stats.node_transitions += 1,
                WorkflowEvent::WorkflowCompleted { .. } => stats.completions += 1,
                WorkflowEvent::WorkflowReset { .. } => stats.resets += 1,
            }
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.node_transitions + self.completions + self.resets
    }
}

pub mod catalog;
pub mod config;
pub mod controller;
pub mod event_log;
pub mod events;
pub mod graph;
pub mod instance;
pub mod readiness;
pub mod scheduler;
pub mod store;

pub use catalog::WorkflowCatalog;
pub use config::{ConfigError, EdgeConfig, GraphConfig, NodeConfig};
pub use controller::{ControllerError, WorkflowController};
pub use event_log::{EventLog, EventRecord, EventStats};
pub use events::{EventMetadata, WorkflowEvent};
pub use graph::{EdgeSpec, Graph, GraphError, NodeSpec, NodeState};
pub use instance::WorkflowInstance;
pub use scheduler::{CompletionCallback, Scheduler};
pub use store::{CompletionStore, FileStore, MemoryStore};

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Durable map from workflow-instance id to "completed".
///
/// The store is the only state shared across instances and process
/// launches. Every operation is infallible from the caller's point of
/// view: a read error or malformed entry degrades to "not completed"
/// (the instance re-simulates) and a write error is logged and dropped.
pub trait CompletionStore: Send + Sync {
    fn contains(&self, instance_id: &str) -> bool;

    /// Idempotent; recording the same instance twice is a no-op.
    fn mark_completed(&self, instance_id: &str);

    /// Forget one instance, forcing its next start to re-run.
    fn clear(&self, instance_id: &str);

    fn clear_all(&self);

    /// Every recorded instance id, in insertion order.
    fn all(&self) -> Vec<String>;
}

/// Ephemeral store for tests and hosts that do not want persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    completed: Arc<Mutex<Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompletionStore for MemoryStore {
    fn contains(&self, instance_id: &str) -> bool {
        self.completed
            .lock()
            .map(|ids| ids.iter().any(|id| id == instance_id))
            .unwrap_or(false)
    }

    fn mark_completed(&self, instance_id: &str) {
        if let Ok(mut ids) = self.completed.lock() {
            if !ids.iter().any(|id| id == instance_id) {
                ids.push(instance_id.to_string());
            }
        }
    }

    fn clear(&self, instance_id: &str) {
        if let Ok(mut ids) = self.completed.lock() {
            ids.retain(|id| id != instance_id);
        }
    }

    fn clear_all(&self) {
        if let Ok(mut ids) = self.completed.lock() {
            ids.clear();
        }
    }

    fn all(&self) -> Vec<String> {
        self.completed
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }
}

/// File-backed store: one JSON file holding an array of completed
/// instance ids, with a write-through in-memory cache.
///
/// The file is read leniently. A missing file, unreadable file, non-array
/// document, or non-string entry never propagates as an error; whatever
/// cannot be understood is treated as absent so the worst outcome is an
/// animation that re-runs instead of one that is silently skipped.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    cache: Mutex<Vec<String>>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        debug!("opening completion ledger at {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    error!("failed to create ledger directory: {}", e);
                }
            }
        }

        let cache = Mutex::new(Self::load(&path));
        Self { path, cache }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Vec<String> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                error!("failed to read ledger {:?}: {}", path, e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(id) => Some(id),
                    other => {
                        warn!("ignoring non-string ledger entry: {}", other);
                        None
                    }
                })
                .collect(),
            Ok(other) => {
                warn!("ledger {:?} is not an array ({}), ignoring", path, other);
                Vec::new()
            }
            Err(e) => {
                error!("ledger {:?} is malformed, ignoring: {}", path, e);
                Vec::new()
            }
        }
    }

    fn persist(&self, ids: &[String]) {
        let json = match serde_json::to_string_pretty(ids) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize ledger: {}", e);
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, json) {
            error!("failed to write ledger {:?}: {}", self.path, e);
        }
    }
}

impl CompletionStore for FileStore {
    fn contains(&self, instance_id: &str) -> bool {
        self.cache
            .lock()
            .map(|ids| ids.iter().any(|id| id == instance_id))
            .unwrap_or(false)
    }

    fn mark_completed(&self, instance_id: &str) {
        if let Ok(mut ids) = self.cache.lock() {
            if !ids.iter().any(|id| id == instance_id) {
                debug!("recording completed instance {}", instance_id);
                ids.push(instance_id.to_string());
                self.persist(&ids);
            }
        }
    }

    fn clear(&self, instance_id: &str) {
        if let Ok(mut ids) = self.cache.lock() {
            let before = ids.len();
            ids.retain(|id| id != instance_id);
            if ids.len() != before {
                debug!("cleared instance {} from ledger", instance_id);
                self.persist(&ids);
            }
        }
    }

    fn clear_all(&self) {
        if let Ok(mut ids) = self.cache.lock() {
            ids.clear();
            self.persist(&ids);
        }
    }

    fn all(&self) -> Vec<String> {
        self.cache
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }
}

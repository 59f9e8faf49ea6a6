//! Workflow Context
//!
//! Per-run key/value data plus an execution log of every tool invocation.
//! Snapshots of both can be persisted through a [`CheckpointStore`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// One tool invocation as seen by the execution log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub tool: String,
    pub duration_ms: u64,
    pub input: Value,
    pub output: Value,
    pub success: bool,
}

/// Snapshot written to a checkpoint store
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub data: Map<String, Value>,
    pub execution_log: Vec<ExecutionRecord>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Shared state of a single workflow run.
///
/// Interior locks let concurrently executing tools append to the log
/// through a shared reference.
#[derive(Debug, Default)]
pub struct WorkflowContext {
    data: Mutex<Map<String, Value>>,
    execution_log: Mutex<Vec<ExecutionRecord>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: Map<String, Value>) -> Self {
        Self {
            data: Mutex::new(data),
            execution_log: Mutex::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.data).get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        lock(&self.data).insert(key.into(), value);
    }

    /// Merge entries into the data map, overwriting existing keys
    pub fn extend(&self, entries: Map<String, Value>) {
        lock(&self.data).extend(entries);
    }

    /// Copy of the data map
    pub fn data(&self) -> Map<String, Value> {
        lock(&self.data).clone()
    }

    pub fn log_execution(&self, record: ExecutionRecord) {
        lock(&self.execution_log).push(record);
    }

    /// Copy of the execution log
    pub fn execution_log(&self) -> Vec<ExecutionRecord> {
        lock(&self.execution_log).clone()
    }

    pub fn snapshot(&self) -> Checkpoint {
        Checkpoint {
            data: self.data(),
            execution_log: self.execution_log(),
            timestamp: Utc::now(),
        }
    }

    /// Persist a snapshot under `name`
    pub async fn save_checkpoint(&self, store: &dyn CheckpointStore, name: &str) -> Result<()> {
        let checkpoint = self.snapshot();
        store.save(name, &checkpoint).await?;
        tracing::debug!(checkpoint = %name, entries = checkpoint.execution_log.len(), "Saved checkpoint");
        Ok(())
    }
}

/// Checkpoint store trait for persistence
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Save (or replace) a checkpoint
    async fn save(&self, name: &str, checkpoint: &Checkpoint) -> Result<()>;

    /// Load a checkpoint by name
    async fn load(&self, name: &str) -> Result<Option<Checkpoint>>;
}

/// In-memory checkpoint store (for development/testing)
#[derive(Default)]
pub struct MemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of saved checkpoints, sorted
    pub fn names(&self) -> Vec<String> {
        let checkpoints = self.checkpoints.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = checkpoints.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, name: &str, checkpoint: &Checkpoint) -> Result<()> {
        let mut checkpoints = self.checkpoints.write().unwrap_or_else(PoisonError::into_inner);
        checkpoints.insert(name.to_string(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<Checkpoint>> {
        let checkpoints = self.checkpoints.read().unwrap_or_else(PoisonError::into_inner);
        Ok(checkpoints.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_and_log_accumulate() {
        let context = WorkflowContext::new();
        context.insert("query", json!("rust"));
        context.log_execution(ExecutionRecord {
            tool: "search".into(),
            duration_ms: 3,
            input: json!({"q": "rust"}),
            output: json!(["a"]),
            success: true,
        });

        assert_eq!(context.get("query"), Some(json!("rust")));
        assert_eq!(context.execution_log().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryCheckpointStore::new();
        let context = WorkflowContext::new();
        context.insert("answer", json!(42));

        context.save_checkpoint(&store, "after_answer").await.unwrap();

        let loaded = store.load("after_answer").await.unwrap().unwrap();
        assert_eq!(loaded.data.get("answer"), Some(&json!(42)));
        assert!(store.load("missing").await.unwrap().is_none());
        assert_eq!(store.names(), vec!["after_answer"]);
    }
}

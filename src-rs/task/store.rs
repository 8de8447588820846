use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;
use crate::pipeline::ExecutionState;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: ExecutionState,
    pub finished: bool,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(state: ExecutionState, finished: bool) -> Self {
        Self {
            state,
            finished,
            saved_at: Utc::now(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.state.task().task_id
    }

    fn progress(&self) -> (bool, usize) {
        (self.finished, self.state.completed_steps().len())
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), AppError>;
    async fn load(&self, task_id: &str) -> Result<Option<Checkpoint>, AppError>;
}

/// In-process store keyed by task id. Saves never move a task backwards, so
/// racing retries of one task id keep the furthest snapshot.
pub struct MemoryCheckpointStore {
    ttl: Option<Duration>,
    entries: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(map) => map.len(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expired(&self, checkpoint: &Checkpoint) -> bool {
        let ttl = match self.ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok()) {
            Some(ttl) => ttl,
            None => return false,
        };
        checkpoint.saved_at + ttl < Utc::now()
    }
}

fn lock_error() -> AppError {
    AppError::app("checkpoint store lock poisoned")
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), AppError> {
        let mut map = self.entries.write().map_err(|_| lock_error())?;
        if self.ttl.is_some() {
            let before = map.len();
            map.retain(|_, stored| !self.expired(stored));
            if map.len() < before {
                debug!(evicted = before - map.len(), "evicted expired checkpoints");
            }
        }
        let task_id = checkpoint.task_id().to_string();
        if let Some(existing) = map.get(&task_id) {
            if !self.expired(existing) && existing.progress() > checkpoint.progress() {
                debug!(task_id = %task_id, "ignoring checkpoint behind stored progress");
                return Ok(());
            }
        }
        map.insert(task_id, checkpoint);
        Ok(())
    }

    async fn load(&self, task_id: &str) -> Result<Option<Checkpoint>, AppError> {
        let mut map = self.entries.write().map_err(|_| lock_error())?;
        match map.get(task_id) {
            Some(checkpoint) if self.expired(checkpoint) => {
                map.remove(task_id);
                Ok(None)
            }
            Some(checkpoint) => Ok(Some(checkpoint.clone())),
            None => Ok(None),
        }
    }
}

//! Durable execution state, enabling resume after interruption.

use crate::action_plan::StepStatus;
use crate::error::AutoError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::debug;

/// Point-in-time snapshot of one operation's progress, keyed by action-plan
/// step id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub operation_id: String,
    pub status: StepStatus,
    pub task_statuses: HashMap<String, StepStatus>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Durable storage for [`CheckpointState`], keyed by operation id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, state: &CheckpointState) -> Result<(), AutoError>;
    async fn load(&self, operation_id: &str) -> Result<CheckpointState, AutoError>;
    async fn list_operations(&self) -> Result<Vec<String>, AutoError>;
}

/// One JSON file per operation under `dir`, named `<operationId>.json`.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, operation_id: &str) -> PathBuf {
        self.dir.join(format!("{operation_id}.json"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, state: &CheckpointState) -> Result<(), AutoError> {
        fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(state)?;
        let path = self.path_for(&state.operation_id);
        fs::write(&path, bytes).await?;
        debug!(operation_id = %state.operation_id, path = %path.display(), "checkpoint saved");
        Ok(())
    }

    async fn load(&self, operation_id: &str) -> Result<CheckpointState, AutoError> {
        let path = self.path_for(operation_id);
        let bytes = fs::read(&path)
            .await
            .map_err(|_| AutoError::CheckpointMissing(operation_id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn list_operations(&self) -> Result<Vec<String>, AutoError> {
        list_json_stems(&self.dir).await
    }
}

async fn list_json_stems(dir: &Path) -> Result<Vec<String>, AutoError> {
    let mut ids = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
    }
    ids.sort();
    Ok(ids)
}

/// In-process, non-durable store — used by tests and by CLI invocations that
/// opt out of filesystem checkpointing.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    states: Mutex<HashMap<String, CheckpointState>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, state: &CheckpointState) -> Result<(), AutoError> {
        self.states
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(state.operation_id.clone(), state.clone());
        Ok(())
    }

    async fn load(&self, operation_id: &str) -> Result<CheckpointState, AutoError> {
        self.states
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(operation_id)
            .cloned()
            .ok_or_else(|| AutoError::CheckpointMissing(operation_id.to_string()))
    }

    async fn list_operations(&self) -> Result<Vec<String>, AutoError> {
        let mut ids: Vec<String> = self.states.lock().unwrap_or_else(|p| p.into_inner()).keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use baton_core::error::{BatonError, Result};
use baton_core::state::WorkflowState;
use baton_core::types::{ErrorRecord, WorkflowMessage, WorkflowStatus};

/// A transcript message flattened to a transport-safe shape: the kind
/// and text up front, everything else in an `extra` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl NormalizedMessage {
    fn from_message(message: &WorkflowMessage) -> Self {
        let mut extra = serde_json::Map::new();
        if let Some(sender) = &message.sender {
            extra.insert("sender".into(), serde_json::json!(sender.as_str()));
        }
        if let Some(recipient) = &message.recipient {
            extra.insert("recipient".into(), serde_json::json!(recipient.as_str()));
        }
        if let Some(tool_name) = &message.tool_name {
            extra.insert("tool_name".into(), serde_json::json!(tool_name));
        }
        if !message.metadata.is_empty() {
            extra.insert("metadata".into(), serde_json::json!(message.metadata));
        }
        extra.insert(
            "timestamp".into(),
            serde_json::json!(message.timestamp.to_rfc3339()),
        );

        Self {
            kind: message.kind.as_str().to_string(),
            content: message.content.clone(),
            extra,
        }
    }
}

/// One persisted run: the final state with messages normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub thread_id: String,
    pub status: WorkflowStatus,
    pub messages: Vec<NormalizedMessage>,
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub artifacts: std::collections::HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorRecord>,
    pub saved_at: DateTime<Utc>,
}

/// Writes one JSON file per run under a configured directory.
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{thread_id}.json"))
    }

    /// Persist a final state keyed by its thread id.
    pub async fn save(&self, state: &WorkflowState) -> Result<PathBuf> {
        let thread_id = state
            .thread_id()
            .ok_or_else(|| BatonError::History("state carries no thread id".to_string()))?
            .to_string();

        let record = HistoryRecord {
            thread_id: thread_id.clone(),
            status: state.status,
            messages: state
                .messages
                .iter()
                .map(NormalizedMessage::from_message)
                .collect(),
            artifacts: state.artifacts.clone(),
            metadata: state.metadata.clone(),
            errors: state.errors.clone(),
            saved_at: Utc::now(),
        };

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&thread_id);
        let json = serde_json::to_vec_pretty(&record)?;
        tokio::fs::write(&path, json).await?;

        info!(thread_id = %thread_id, path = %path.display(), "Run history saved");
        Ok(path)
    }

    /// Load a persisted run. `Ok(None)` when no file exists for the id.
    pub async fn load(&self, thread_id: &str) -> Result<Option<HistoryRecord>> {
        let path = self.path_for(thread_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(thread_id = %thread_id, "No history file");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let record = serde_json::from_slice(&bytes)?;
        Ok(Some(record))
    }
}

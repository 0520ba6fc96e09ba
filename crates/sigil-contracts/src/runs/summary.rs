use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Diagnostic receipt written when a session finishes. Never read back by
/// the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub total_batches: u64,
    pub failed_batches: u64,
    pub total_artifacts: u64,
    pub total_remixes: u64,
    pub current_artifact_id: Option<String>,
}

#[derive(Serialize)]
struct SummaryFile<'a> {
    #[serde(flatten)]
    summary: &'a SessionSummary,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl SessionSummary {
    /// Writes pretty JSON to `path`. `extra` keys that clash with summary
    /// fields are skipped.
    pub fn write(&self, path: &Path, extra: &Map<String, Value>) -> anyhow::Result<()> {
        let taken = match serde_json::to_value(self)? {
            Value::Object(fields) => fields.into_iter().map(|(key, _)| key).collect(),
            _ => Vec::new(),
        };
        let extra = extra
            .iter()
            .filter(|(key, _)| !taken.contains(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let body = serde_json::to_string_pretty(&SummaryFile {
            summary: self,
            extra,
        })?;

        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
    }
}

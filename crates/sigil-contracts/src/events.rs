use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

const RESERVED_KEYS: [&str; 3] = ["type", "session_id", "ts"];

/// Append-only JSONL diagnostics log for one session.
///
/// Every line is one compact object carrying `type`, `session_id` and `ts`
/// followed by the caller's payload. Payload keys that collide with those
/// three are dropped. Clones share the same handle, so concurrent dispatch
/// workers never interleave partial lines.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    path: PathBuf,
    session_id: String,
    file: Mutex<Option<File>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                session_id: session_id.into(),
                file: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Appends one event and returns the object that was written.
    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::with_capacity(payload.len() + RESERVED_KEYS.len());
        event.insert("type".into(), Value::from(event_type));
        event.insert("session_id".into(), Value::from(self.session_id()));
        event.insert(
            "ts".into(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
        );
        event.extend(
            payload
                .into_iter()
                .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str())),
        );

        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');

        let mut slot = self
            .shared
            .file
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        if let Some(file) = slot.as_mut() {
            file.write_all(&line)
                .with_context(|| format!("failed to append to {}", self.shared.path.display()))?;
        }
        Ok(Value::Object(event))
    }

    /// Like [`EventWriter::emit`], but a failed write is only reported on
    /// stderr. Diagnostics never fail a batch.
    pub fn emit_quiet(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.emit(event_type, payload) {
            eprintln!("sigil: failed to record {event_type} event: {err:#}");
        }
    }

    fn open(&self) -> anyhow::Result<File> {
        let path = &self.shared.path;
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open event log {}", path.display()))
    }
}

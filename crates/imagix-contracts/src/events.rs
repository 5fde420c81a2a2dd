use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

pub const SESSION_STARTED: &str = "session_started";
pub const PROMPT_ENHANCED: &str = "prompt_enhanced";
pub const GENERATION_STARTED: &str = "generation_started";
pub const MODEL_FALLBACK: &str = "model_fallback";
pub const IMAGE_GENERATED: &str = "image_generated";
pub const GENERATION_FAILED: &str = "generation_failed";
pub const HISTORY_DELETED: &str = "history_deleted";
pub const PLAN_CHANGED: &str = "plan_changed";

/// Append-only writer for the studio's `events.jsonl`.
///
/// Every line carries `type`, `session_id` and `ts`; caller payload is merged
/// last and may override them.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        event.extend(payload);

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        writeln!(file, "{line}")?;

        Ok(Value::Object(event))
    }

    /// Reads back every well-formed event line. Malformed lines are skipped.
    pub fn read_all(&self) -> anyhow::Result<Vec<Value>> {
        if !self.inner.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.inner.path)?;
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .collect())
    }
}

pub fn payload(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::json;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-1");

        let emitted = writer.emit(
            IMAGE_GENERATED,
            payload(json!({"model": "gemini-2.5-flash-image"})),
        )?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], json!("image_generated"));
        assert_eq!(parsed["session_id"], json!("session-1"));
        assert_eq!(parsed["model"], json!("gemini-2.5-flash-image"));
        DateTime::parse_from_rfc3339(parsed["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn payload_can_override_default_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-1");

        let emitted = writer.emit(
            SESSION_STARTED,
            payload(json!({"session_id": "replayed"})),
        )?;
        assert_eq!(emitted["session_id"], json!("replayed"));
        Ok(())
    }

    #[test]
    fn read_all_returns_events_in_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("nested").join("events.jsonl"), "s");
        assert!(writer.read_all()?.is_empty());

        writer.emit(GENERATION_STARTED, EventPayload::new())?;
        writer.emit(GENERATION_FAILED, EventPayload::new())?;

        let types: Vec<String> = writer
            .read_all()?
            .iter()
            .filter_map(|row| row["type"].as_str().map(str::to_string))
            .collect();
        assert_eq!(types, vec!["generation_started", "generation_failed"]);
        Ok(())
    }
}

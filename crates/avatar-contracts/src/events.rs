use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Everything the avatar services log. Kept closed so a log consumer can
/// match on `type` without guessing at free-form names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ServerStarted,
    ModelAttemptFailed,
    GenerationSucceeded,
    GenerationFailed,
    HistoryLoadFailed,
    HistoryPersistFailed,
    GalleryOperationFailed,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::ServerStarted,
        EventKind::ModelAttemptFailed,
        EventKind::GenerationSucceeded,
        EventKind::GenerationFailed,
        EventKind::HistoryLoadFailed,
        EventKind::HistoryPersistFailed,
        EventKind::GalleryOperationFailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ServerStarted => "server_started",
            EventKind::ModelAttemptFailed => "model_attempt_failed",
            EventKind::GenerationSucceeded => "generation_succeeded",
            EventKind::GenerationFailed => "generation_failed",
            EventKind::HistoryLoadFailed => "history_load_failed",
            EventKind::HistoryPersistFailed => "history_persist_failed",
            EventKind::GalleryOperationFailed => "gallery_operation_failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Appends one JSON object per line to a session's `events.jsonl`.
///
/// Each line starts with `type`, `session_id` and `ts`; the payload follows
/// and cannot replace those three.
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

    pub fn emit(&self, kind: EventKind, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.entry(key).or_insert(value);
        }

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
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

/// Emits through an optional writer. A write failure is reported on stderr
/// and never interrupts the caller.
pub fn emit_event(events: Option<&EventWriter>, kind: EventKind, payload: EventPayload) {
    let Some(writer) = events else {
        return;
    };
    if let Err(err) = writer.emit(kind, payload) {
        eprintln!("event {kind} not written to {}: {err:#}", writer.path().display());
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
    use std::collections::HashSet;
    use std::fs;

    use chrono::DateTime;
    use serde_json::json;

    use super::*;

    fn read_events(path: &Path) -> anyhow::Result<Vec<Value>> {
        fs::read_to_string(path)?
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).map_err(anyhow::Error::from))
            .collect()
    }

    #[test]
    fn attempt_failure_line_carries_session_and_reason() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let emitted = writer.emit(
            EventKind::ModelAttemptFailed,
            payload(json!({"model": "gemini-2.0-flash", "reason": "429 quota exceeded"})),
        )?;

        let logged = read_events(&path)?;
        assert_eq!(logged, vec![emitted]);
        assert_eq!(logged[0]["type"], "model_attempt_failed");
        assert_eq!(logged[0]["session_id"], "session-123");
        assert_eq!(logged[0]["reason"], "429 quota exceeded");
        DateTime::parse_from_rfc3339(logged[0]["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn payload_cannot_spoof_event_type_or_session() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-123");

        let emitted = writer.emit(
            EventKind::GenerationFailed,
            payload(json!({
                "type": "generation_succeeded",
                "session_id": "other",
                "message": "All models failed. Last error: Unknown error",
            })),
        )?;

        assert_eq!(emitted["type"], "generation_failed");
        assert_eq!(emitted["session_id"], "session-123");
        assert_eq!(emitted["message"], "All models failed. Last error: Unknown error");
        Ok(())
    }

    #[test]
    fn emit_event_appends_in_order_and_skips_missing_writer() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let writer = EventWriter::new(&path, "server");

        emit_event(None, EventKind::ServerStarted, EventPayload::new());
        emit_event(Some(&writer), EventKind::ServerStarted, EventPayload::new());
        emit_event(Some(&writer), EventKind::HistoryLoadFailed, EventPayload::new());

        let types: Vec<Value> = read_events(&path)?
            .into_iter()
            .map(|event| event["type"].clone())
            .collect();
        assert_eq!(types, vec![json!("server_started"), json!("history_load_failed")]);
        Ok(())
    }

    #[test]
    fn kind_names_are_unique_snake_case() {
        let names: HashSet<&str> = EventKind::ALL.iter().map(|kind| kind.as_str()).collect();
        assert_eq!(names.len(), EventKind::ALL.len());
        assert!(names
            .iter()
            .all(|name| name.chars().all(|c| c.is_ascii_lowercase() || c == '_')));
    }
}

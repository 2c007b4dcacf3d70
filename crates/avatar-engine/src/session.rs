use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use avatar_contracts::artifacts::Artifact;
use avatar_contracts::events::{emit_event, payload, EventKind, EventWriter};
use avatar_contracts::history::HistoryCache;
use avatar_contracts::storage::KeyValueStore;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a generation is already in progress")]
    Busy,
    #[error("no history entry at index {0}")]
    NoSuchEntry(usize),
}

/// Client-side generator state: the loading flag, the displayed artifact, the
/// last error, and local history. Handlers mutate it explicitly instead of
/// sharing globals.
#[derive(Debug)]
pub struct GeneratorSession<S: KeyValueStore> {
    loading: bool,
    current: Option<Artifact>,
    error: Option<String>,
    history: HistoryCache<S>,
    events: Option<EventWriter>,
}

impl<S: KeyValueStore> GeneratorSession<S> {
    pub fn open(store: S, events: Option<EventWriter>) -> Self {
        let history = HistoryCache::load(store);
        if let Some(reason) = history.load_error() {
            emit_event(
                events.as_ref(),
                EventKind::HistoryLoadFailed,
                payload(json!({ "reason": reason })),
            );
        }
        Self {
            loading: false,
            current: None,
            error: None,
            history,
            events,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn current(&self) -> Option<&Artifact> {
        self.current.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn history(&self) -> &HistoryCache<S> {
        &self.history
    }

    /// Raises the loading flag. A second generation while one is in flight is
    /// refused rather than queued.
    pub fn begin_generation(&mut self) -> Result<(), SessionError> {
        if self.loading {
            return Err(SessionError::Busy);
        }
        self.loading = true;
        self.error = None;
        Ok(())
    }

    pub fn finish_generation(&mut self, outcome: Result<Artifact, String>) {
        self.loading = false;
        match outcome {
            Ok(artifact) => {
                self.current = Some(artifact.clone());
                self.error = None;
                if let Err(err) = self.history.record(artifact) {
                    emit_event(
                        self.events.as_ref(),
                        EventKind::HistoryPersistFailed,
                        payload(json!({ "reason": format!("{err:#}") })),
                    );
                }
            }
            Err(message) => {
                self.error = Some(message);
            }
        }
    }

    /// Runs one generation between [`begin_generation`](Self::begin_generation)
    /// and [`finish_generation`](Self::finish_generation). Failures end up in
    /// [`error`](Self::error); only a refused start is returned as `Err`.
    pub fn generate_with<F>(&mut self, generate: F) -> Result<Option<&Artifact>, SessionError>
    where
        F: FnOnce() -> Result<Artifact>,
    {
        self.begin_generation()?;
        let outcome = generate().map_err(|err| err.to_string());
        let succeeded = outcome.is_ok();
        self.finish_generation(outcome);
        Ok(if succeeded { self.current.as_ref() } else { None })
    }

    pub fn select_history(&mut self, index: usize) -> Result<&Artifact, SessionError> {
        let artifact = self
            .history
            .select(index)
            .cloned()
            .ok_or(SessionError::NoSuchEntry(index))?;
        Ok(self.current.insert(artifact))
    }

    /// Writes the displayed SVG to `dir/avatar-<timestamp>.svg`.
    pub fn download_current(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let Some(artifact) = self.current.as_ref() else {
            return Ok(None);
        };
        write_svg(dir, &artifact.file_name(), &artifact.content).map(Some)
    }
}

pub(crate) fn write_svg(dir: &Path, file_name: &str, svg: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(file_name);
    fs::write(&path, svg).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

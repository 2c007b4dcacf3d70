use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use avatar_contracts::events::{emit_event, payload, EventKind, EventWriter};
use avatar_contracts::models::ModelChain;
use avatar_contracts::svg::extract_svg;
use serde_json::json;
use thiserror::Error;

use crate::error_chain_text;
use crate::provider::{CompletionRequest, TextProvider};

const PROVIDER_ERROR_MAX_CHARS: usize = 512;

/// Shared cancellation signal, checked before every model attempt.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAttempt {
    pub model_id: String,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub svg: String,
    pub model_id: String,
    pub attempts: Vec<ModelAttempt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("All models failed. Last error: {last_error}")]
    Exhausted {
        last_error: String,
        attempts: Vec<ModelAttempt>,
    },
    #[error("Generation cancelled after {} attempt(s)", .attempts.len())]
    Cancelled { attempts: Vec<ModelAttempt> },
}

impl GenerationError {
    pub fn attempts(&self) -> &[ModelAttempt] {
        match self {
            GenerationError::Exhausted { attempts, .. } => attempts,
            GenerationError::Cancelled { attempts } => attempts,
        }
    }
}

/// Tries each model of the chain in order until one answers with an SVG span.
///
/// Requests are strictly sequential and each model id gets exactly one
/// request. Per-attempt failures stay inside; only exhaustion or cancellation
/// reaches the caller.
#[derive(Debug, Clone)]
pub struct FallbackGenerator {
    models: ModelChain,
    attempt_timeout: Duration,
    events: Option<EventWriter>,
}

impl FallbackGenerator {
    pub fn new(models: ModelChain, attempt_timeout: Duration) -> Self {
        Self {
            models,
            attempt_timeout,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<EventWriter>) -> Self {
        self.events = events;
        self
    }

    pub fn models(&self) -> &ModelChain {
        &self.models
    }

    pub fn generate(
        &self,
        provider: &dyn TextProvider,
        prompt: &str,
        cancel: &CancelFlag,
    ) -> Result<Generation, GenerationError> {
        let mut attempts = Vec::with_capacity(self.models.len());
        let mut last_error: Option<String> = None;

        for model in self.models.iter() {
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled { attempts });
            }

            let request = CompletionRequest {
                model: model.to_string(),
                prompt: prompt.to_string(),
                timeout: self.attempt_timeout,
            };
            let reason = match provider.complete(&request) {
                Ok(text) => match extract_svg(&text) {
                    Ok(svg) => {
                        attempts.push(ModelAttempt {
                            model_id: model.to_string(),
                            outcome: AttemptOutcome::Success,
                        });
                        emit_event(
                            self.events.as_ref(),
                            EventKind::GenerationSucceeded,
                            payload(json!({
                                "provider": provider.name(),
                                "model": model,
                                "attempts": attempts.len(),
                            })),
                        );
                        return Ok(Generation {
                            svg: svg.to_string(),
                            model_id: model.to_string(),
                            attempts,
                        });
                    }
                    Err(err) => err.to_string(),
                },
                Err(err) => error_chain_text(&err, PROVIDER_ERROR_MAX_CHARS),
            };

            emit_event(
                self.events.as_ref(),
                EventKind::ModelAttemptFailed,
                payload(json!({
                    "provider": provider.name(),
                    "model": model,
                    "reason": reason,
                })),
            );
            attempts.push(ModelAttempt {
                model_id: model.to_string(),
                outcome: AttemptOutcome::Failure(reason.clone()),
            });
            last_error = Some(reason);
        }

        Err(GenerationError::Exhausted {
            last_error: last_error.unwrap_or_else(|| "Unknown error".to_string()),
            attempts,
        })
    }
}

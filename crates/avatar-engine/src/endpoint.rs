use std::sync::Arc;

use avatar_contracts::artifacts::{ErrorEnvelope, GenerateResponse};
use avatar_contracts::events::{emit_event, payload, EventKind, EventWriter};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;

use crate::config::GenerationConfig;
use crate::error_chain_text;
use crate::gemini::GeminiProvider;
use crate::generator::{CancelFlag, FallbackGenerator, Generation};
use crate::provider::TextProvider;

pub const GENERATE_AVATAR_PATH: &str = "/api/generate-avatar";
pub const GENERATION_FAILED_ERROR: &str = "Failed to generate avatar";

/// Builds the provider for one request from the configured credential.
pub type ProviderFactory =
    Arc<dyn Fn(&GenerationConfig, &str) -> anyhow::Result<Box<dyn TextProvider>> + Send + Sync>;

#[derive(Clone)]
pub struct EndpointState {
    config: Arc<GenerationConfig>,
    connect: ProviderFactory,
    events: Option<EventWriter>,
}

impl EndpointState {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            config: Arc::new(config),
            connect: Arc::new(
                |config: &GenerationConfig,
                 api_key: &str|
                 -> anyhow::Result<Box<dyn TextProvider>> {
                    let provider = GeminiProvider::new(api_key, config.api_base.as_deref())?;
                    Ok(Box::new(provider))
                },
            ),
            events: None,
        }
    }

    pub fn with_provider_factory(mut self, connect: ProviderFactory) -> Self {
        self.connect = connect;
        self
    }

    pub fn with_events(mut self, events: Option<EventWriter>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }
}

pub fn router(state: EndpointState) -> Router {
    Router::new()
        .route(GENERATE_AVATAR_PATH, get(generate_avatar))
        .route("/healthz", get(healthz))
        .with_state(state)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointReply {
    Generated(GenerateResponse),
    Failed(ErrorEnvelope),
}

impl EndpointReply {
    pub fn status(&self) -> StatusCode {
        match self {
            EndpointReply::Generated(_) => StatusCode::OK,
            EndpointReply::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EndpointReply {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            EndpointReply::Generated(body) => (status, Json(body)).into_response(),
            EndpointReply::Failed(body) => (status, Json(body)).into_response(),
        }
    }
}

async fn generate_avatar(State(state): State<EndpointState>) -> EndpointReply {
    handle_generate(&state).await
}

async fn healthz() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Sets the flag if the request future is dropped before generation ends,
/// e.g. when the HTTP client disconnects.
struct CancelOnDrop {
    flag: CancelFlag,
    armed: bool,
}

impl CancelOnDrop {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.cancel();
        }
    }
}

pub async fn handle_generate(state: &EndpointState) -> EndpointReply {
    let api_key = match state.config.credential() {
        Ok(key) => key.to_string(),
        Err(err) => {
            emit_event(
                state.events.as_ref(),
                EventKind::GenerationFailed,
                payload(json!({ "message": err.to_string() })),
            );
            return EndpointReply::Failed(ErrorEnvelope::new(err.to_string()));
        }
    };

    let cancel = CancelFlag::new();
    let guard = CancelOnDrop {
        flag: cancel.clone(),
        armed: true,
    };
    let config = state.config.clone();
    let connect = state.connect.clone();
    let generator = FallbackGenerator::new(config.models.clone(), config.attempt_timeout)
        .with_events(state.events.clone());

    // The provider does blocking I/O, so it is built and used off the runtime.
    let joined = tokio::task::spawn_blocking(move || -> anyhow::Result<Generation> {
        let provider = connect(&config, &api_key)?;
        Ok(generator.generate(provider.as_ref(), config.style.prompt(), &cancel)?)
    })
    .await;
    guard.disarm();

    let outcome = match joined {
        Ok(outcome) => outcome,
        Err(join_err) => Err(anyhow::anyhow!("generation task failed: {join_err}")),
    };

    match outcome {
        Ok(generation) => EndpointReply::Generated(GenerateResponse {
            svg: generation.svg,
            timestamp: Utc::now().timestamp_millis(),
        }),
        Err(err) => {
            let message = error_chain_text(&err, 1024);
            eprintln!("Error generating avatar: {message}");
            emit_event(
                state.events.as_ref(),
                EventKind::GenerationFailed,
                payload(json!({ "message": message })),
            );
            EndpointReply::Failed(ErrorEnvelope::with_message(
                GENERATION_FAILED_ERROR,
                message,
            ))
        }
    }
}

pub mod client;
pub mod config;
pub mod endpoint;
pub mod gallery;
pub mod gemini;
pub mod generator;
pub mod prompt;
pub mod provider;
pub mod session;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Response as HttpResponse;
use serde_json::Value;

pub use client::EndpointClient;
pub use config::{ConfigError, GalleryConfig, GenerationConfig};
pub use endpoint::{router, EndpointState, GENERATE_AVATAR_PATH};
pub use gallery::{GalleryError, GalleryStore, GalleryView, MemoryGallery, SupabaseGallery};
pub use gemini::GeminiProvider;
pub use generator::{
    AttemptOutcome, CancelFlag, FallbackGenerator, Generation, GenerationError, ModelAttempt,
};
pub use prompt::AvatarStyle;
pub use provider::{CompletionRequest, TextProvider};
pub use session::{GeneratorSession, SessionError};

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::{error_chain_text, truncate_text};

    #[test]
    fn error_chain_text_preserves_nested_contexts() {
        let err = anyhow!("connection reset")
            .context("Gemini request failed (gemini-2.0-flash)")
            .context("Gemini request failed (gemini-2.0-flash)");
        assert_eq!(
            error_chain_text(&err, 200),
            "Gemini request failed (gemini-2.0-flash) | caused by: connection reset"
        );
    }

    #[test]
    fn truncate_text_appends_ellipsis() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }
}

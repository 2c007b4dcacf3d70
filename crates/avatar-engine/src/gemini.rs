use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::provider::{CompletionRequest, TextProvider};
use crate::response_json_or_error;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, api_base: Option<&str>) -> Result<Self> {
        let http = HttpClient::builder()
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            api_base: api_base
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            api_key: api_key.into(),
            http,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(prompt: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
        })
    }

    fn extract_text(response_payload: &Value) -> Result<String> {
        let candidates = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = String::new();

        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
        }

        if out.trim().is_empty() {
            let reason = response_payload
                .get("promptFeedback")
                .and_then(|feedback| feedback.get("blockReason"))
                .and_then(Value::as_str);
            match reason {
                Some(reason) => bail!("Gemini returned no text (blocked: {reason})"),
                None => bail!("Gemini returned no text"),
            }
        }
        Ok(out)
    }
}

impl TextProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let endpoint = self.endpoint_for_model(&request.model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .timeout(request.timeout)
            .json(&Self::build_payload(&request.prompt))
            .send()
            // The query string carries the key; keep it out of error text.
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Gemini request failed ({})", request.model))?;
        let payload = response_json_or_error("Gemini", response)?;
        Self::extract_text(&payload)
    }
}

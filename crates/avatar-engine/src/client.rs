use anyhow::{bail, Context, Result};
use avatar_contracts::artifacts::{Artifact, GenerateResponse};
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;

use crate::endpoint::{GENERATE_AVATAR_PATH, GENERATION_FAILED_ERROR};

/// Calls a running generation endpoint the way the browser client does.
pub struct EndpointClient {
    base_url: String,
    http: HttpClient,
}

impl EndpointClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            http: HttpClient::builder()
                .build()
                .context("failed to build endpoint HTTP client")?,
        })
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, GENERATE_AVATAR_PATH)
    }

    pub fn fetch_avatar(&self) -> Result<Artifact> {
        let url = self.url();
        let response = self
            .http
            .get(&url)
            .send()
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .with_context(|| format!("response body from {url} unreadable"))?;
        artifact_from_reply(status, &body)
    }
}

/// Non-2xx replies surface the envelope's `error` field, as the UI shows it.
fn artifact_from_reply(status: u16, body: &str) -> Result<Artifact> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| value.get("error").and_then(Value::as_str).map(str::to_string))
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| GENERATION_FAILED_ERROR.to_string());
        bail!(message);
    }
    let reply: GenerateResponse =
        serde_json::from_str(body).context("endpoint returned an unexpected payload")?;
    Ok(reply.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_reply_becomes_artifact() -> Result<()> {
        let artifact = artifact_from_reply(200, r#"{"svg":"<svg>cat</svg>","timestamp":42}"#)?;
        assert_eq!(artifact, Artifact::new("<svg>cat</svg>", 42));
        Ok(())
    }

    #[test]
    fn error_reply_surfaces_error_field() {
        let err = artifact_from_reply(500, r#"{"error":"API Error"}"#)
            .err()
            .map(|err| err.to_string());
        assert_eq!(err.as_deref(), Some("API Error"));
    }

    #[test]
    fn error_reply_without_envelope_uses_default_message() {
        let err = artifact_from_reply(502, "<html>bad gateway</html>")
            .err()
            .map(|err| err.to_string());
        assert_eq!(err.as_deref(), Some("Failed to generate avatar"));
    }

    #[test]
    fn url_joins_base_and_route() -> Result<()> {
        let client = EndpointClient::new("http://127.0.0.1:4321/")?;
        assert_eq!(client.url(), "http://127.0.0.1:4321/api/generate-avatar");
        Ok(())
    }
}

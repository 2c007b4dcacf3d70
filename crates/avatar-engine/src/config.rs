use std::env;
use std::time::Duration;

use avatar_contracts::models::ModelChain;
use thiserror::Error;

use crate::prompt::AvatarStyle;

pub const MISSING_CREDENTIAL_MESSAGE: &str = "GEMINI_API_KEY is not configured";
pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:4321";

const DEFAULT_ATTEMPT_TIMEOUT_S: f64 = 60.0;
const MIN_ATTEMPT_TIMEOUT_S: f64 = 5.0;
const MAX_ATTEMPT_TIMEOUT_S: f64 = 300.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY is not configured")]
    MissingCredential,
    #[error("unknown avatar style '{0}'")]
    UnknownStyle(String),
    #[error("AVATAR_MODELS does not name any model")]
    EmptyModelChain,
    #[error("{0} is not configured")]
    Missing(&'static str),
}

/// Everything the generation endpoint needs. A missing credential is kept as
/// `None` so the server can start and report it per request.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub models: ModelChain,
    pub style: AvatarStyle,
    pub attempt_timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            models: ModelChain::default(),
            style: AvatarStyle::default(),
            attempt_timeout: Duration::from_secs_f64(DEFAULT_ATTEMPT_TIMEOUT_S),
        }
    }
}

impl GenerationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let models = match lookup("AVATAR_MODELS") {
            Some(raw) => {
                let chain = ModelChain::parse(&raw);
                if chain.is_empty() {
                    return Err(ConfigError::EmptyModelChain);
                }
                chain
            }
            None => ModelChain::default(),
        };
        let style = match lookup("AVATAR_STYLE") {
            Some(raw) => raw.parse()?,
            None => AvatarStyle::default(),
        };
        let attempt_timeout = lookup("AVATAR_ATTEMPT_TIMEOUT_S")
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(DEFAULT_ATTEMPT_TIMEOUT_S)
            .clamp(MIN_ATTEMPT_TIMEOUT_S, MAX_ATTEMPT_TIMEOUT_S);

        Ok(Self {
            api_key: lookup("GEMINI_API_KEY"),
            api_base: lookup("GEMINI_API_BASE"),
            models,
            style,
            attempt_timeout: Duration::from_secs_f64(attempt_timeout),
        })
    }

    pub fn credential(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential)
    }
}

#[derive(Debug, Clone)]
pub struct GalleryConfig {
    pub url: String,
    pub anon_key: String,
    pub access_token: Option<String>,
    /// Owner filter for gallery listings; the signed-in user's id.
    pub user_id: Option<String>,
}

impl GalleryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            url: lookup("SUPABASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .ok_or(ConfigError::Missing("SUPABASE_URL"))?,
            anon_key: lookup("SUPABASE_ANON_KEY").ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            access_token: lookup("SUPABASE_ACCESS_TOKEN"),
            user_id: lookup("SUPABASE_USER_ID"),
        })
    }
}

pub fn http_bind_from_env() -> String {
    non_empty_env("AVATAR_HTTP_BIND").unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string())
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_environment() -> anyhow::Result<()> {
        let config = GenerationConfig::from_lookup(|_| None)?;
        assert_eq!(config.api_key, None);
        assert_eq!(config.credential(), Err(ConfigError::MissingCredential));
        assert_eq!(config.models, ModelChain::default());
        assert_eq!(config.style, AvatarStyle::GeometricCat);
        assert_eq!(config.attempt_timeout, Duration::from_secs(60));
        assert_eq!(
            ConfigError::MissingCredential.to_string(),
            MISSING_CREDENTIAL_MESSAGE
        );
        Ok(())
    }

    #[test]
    fn overrides_are_read_and_timeout_is_clamped() -> anyhow::Result<()> {
        let config = GenerationConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "secret"),
            ("AVATAR_MODELS", "m1,m2"),
            ("AVATAR_ATTEMPT_TIMEOUT_S", "1"),
        ]))?;
        assert_eq!(config.credential(), Ok("secret"));
        assert_eq!(config.models.iter().collect::<Vec<_>>(), vec!["m1", "m2"]);
        assert_eq!(config.attempt_timeout, Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn rejects_unknown_style_and_blank_chain() {
        let style = GenerationConfig::from_lookup(lookup_from(&[("AVATAR_STYLE", "pixel-dog")]));
        assert_eq!(
            style.err(),
            Some(ConfigError::UnknownStyle("pixel-dog".to_string()))
        );
        let chain = GenerationConfig::from_lookup(lookup_from(&[("AVATAR_MODELS", ",")]));
        assert_eq!(chain.err(), Some(ConfigError::EmptyModelChain));
    }

    #[test]
    fn gallery_config_requires_url_and_key() -> anyhow::Result<()> {
        let missing = GalleryConfig::from_lookup(lookup_from(&[("SUPABASE_URL", "https://x")]));
        assert_eq!(
            missing.err().map(|err| err.to_string()),
            Some("SUPABASE_ANON_KEY is not configured".to_string())
        );
        let config = GalleryConfig::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "https://project.supabase.co/"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]))?;
        assert_eq!(config.url, "https://project.supabase.co");
        assert_eq!(config.access_token, None);
        assert_eq!(config.user_id, None);
        Ok(())
    }
}

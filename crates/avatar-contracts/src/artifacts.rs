use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One generated SVG image and the moment it was produced.
///
/// The serialized shape (`{"svg", "timestamp"}`) is shared by the endpoint's
/// success envelope and the persisted history array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "svg")]
    pub content: String,
    #[serde(rename = "timestamp")]
    pub created_at: i64,
}

impl Artifact {
    pub fn new(content: impl Into<String>, created_at: i64) -> Self {
        Self {
            content: content.into(),
            created_at,
        }
    }

    pub fn now(content: impl Into<String>) -> Self {
        Self::new(content, Utc::now().timestamp_millis())
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_at).single()
    }

    pub fn file_name(&self) -> String {
        format!("avatar-{}.svg", self.created_at)
    }
}

/// A gallery row as stored by the hosted backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAvatar {
    pub id: i64,
    pub svg: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "user_id", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl SavedAvatar {
    pub fn file_name(&self) -> String {
        format!("avatar-{}.svg", self.id)
    }
}

/// `200` body of the generation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub svg: String,
    pub timestamp: i64,
}

impl From<GenerateResponse> for Artifact {
    fn from(value: GenerateResponse) -> Self {
        Artifact::new(value.svg, value.timestamp)
    }
}

/// `500` body of the generation endpoint. `message` is absent for
/// configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: Some(message.into()),
        }
    }
}

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use avatar_contracts::artifacts::SavedAvatar;
use avatar_contracts::events::{emit_event, payload, EventKind, EventWriter};
use chrono::Utc;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response as HttpResponse};
use reqwest::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::GalleryConfig;
use crate::session::write_svg;
use crate::truncate_text;

pub const AVATARS_TABLE: &str = "avatars";
pub const SAVE_FUNCTION: &str = "save-avatar";
const LIST_FAILED_MESSAGE: &str = "Failed to load gallery";
const DELETE_FAILED_MESSAGE: &str = "Failed to delete avatar";
const SAVE_FAILED_MESSAGE: &str = "Failed to save avatar";

/// Every failure the hosted store can produce, translated at the adapter
/// boundary so callers never inspect raw responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GalleryError {
    #[error("sign in to use the gallery")]
    Unauthenticated,
    #[error("not allowed to modify this avatar")]
    Forbidden,
    #[error("avatar {0} not found")]
    NotFound(i64),
    #[error("gallery request failed: {0}")]
    Network(String),
    #[error("{0}")]
    Rejected(String),
    #[error("gallery returned an unexpected response: {0}")]
    InvalidResponse(String),
}

pub trait GalleryStore {
    /// The owner's saved avatars, newest first.
    fn list(&self, owner: &str) -> Result<Vec<SavedAvatar>, GalleryError>;
    fn delete(&self, id: i64) -> Result<(), GalleryError>;
    fn save(&self, svg: &str) -> Result<SavedAvatar, GalleryError>;
}

impl<G: GalleryStore + ?Sized> GalleryStore for &G {
    fn list(&self, owner: &str) -> Result<Vec<SavedAvatar>, GalleryError> {
        (**self).list(owner)
    }

    fn delete(&self, id: i64) -> Result<(), GalleryError> {
        (**self).delete(id)
    }

    fn save(&self, svg: &str) -> Result<SavedAvatar, GalleryError> {
        (**self).save(svg)
    }
}

/// REST adapter for a Supabase project: PostgREST for reads and deletes, an
/// edge function for saves. Ownership is enforced by the backend's row-level
/// security.
pub struct SupabaseGallery {
    config: GalleryConfig,
    http: HttpClient,
}

impl SupabaseGallery {
    pub fn new(config: GalleryConfig) -> Result<Self, GalleryError> {
        let http = HttpClient::builder()
            .build()
            .map_err(|err| GalleryError::Network(err.to_string()))?;
        Ok(Self { config, http })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{AVATARS_TABLE}", self.config.url)
    }

    fn function_url(&self) -> String {
        format!("{}/functions/v1/{SAVE_FUNCTION}", self.config.url)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, GalleryError> {
        let token = self
            .config
            .access_token
            .as_deref()
            .ok_or(GalleryError::Unauthenticated)?;
        Ok(request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token))
    }

    fn send(request: RequestBuilder) -> Result<(StatusCode, String), GalleryError> {
        let response: HttpResponse = request
            .send()
            .map_err(|err| GalleryError::Network(err.without_url().to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|err| GalleryError::Network(err.without_url().to_string()))?;
        Ok((status, body))
    }
}

impl GalleryStore for SupabaseGallery {
    fn list(&self, owner: &str) -> Result<Vec<SavedAvatar>, GalleryError> {
        let owner_filter = format!("eq.{owner}");
        let request = self.http.get(self.table_url()).query(&[
            ("select", "*"),
            ("order", "created_at.desc"),
            ("user_id", owner_filter.as_str()),
        ]);
        let (status, body) = Self::send(self.authorized(request)?)?;
        if !status.is_success() {
            return Err(error_for_status(status, &body, None, LIST_FAILED_MESSAGE));
        }
        serde_json::from_str(&body)
            .map_err(|err| GalleryError::InvalidResponse(err.to_string()))
    }

    fn delete(&self, id: i64) -> Result<(), GalleryError> {
        let id_filter = format!("eq.{id}");
        let request = self
            .http
            .delete(self.table_url())
            .query(&[("id", id_filter.as_str())])
            .header("Prefer", "return=representation");
        let (status, body) = Self::send(self.authorized(request)?)?;
        if !status.is_success() {
            return Err(error_for_status(status, &body, Some(id), DELETE_FAILED_MESSAGE));
        }
        // Row-level security hides rows the caller does not own, so an empty
        // representation covers both "absent" and "someone else's".
        let deleted: Vec<Value> = serde_json::from_str(&body)
            .map_err(|err| GalleryError::InvalidResponse(err.to_string()))?;
        if deleted.is_empty() {
            return Err(GalleryError::NotFound(id));
        }
        Ok(())
    }

    fn save(&self, svg: &str) -> Result<SavedAvatar, GalleryError> {
        let request = self.http.post(self.function_url()).json(&json!({ "svg": svg }));
        let (status, body) = Self::send(self.authorized(request)?)?;
        if !status.is_success() {
            return Err(error_for_status(status, &body, None, SAVE_FAILED_MESSAGE));
        }
        saved_avatar_from_body(&body)
    }
}

/// `fallback` names the failed operation when the body carries no message.
fn error_for_status(
    status: StatusCode,
    body: &str,
    id: Option<i64>,
    fallback: &str,
) -> GalleryError {
    match (status, id) {
        (StatusCode::UNAUTHORIZED, _) => GalleryError::Unauthenticated,
        (StatusCode::FORBIDDEN, _) => GalleryError::Forbidden,
        (StatusCode::NOT_FOUND, Some(id)) => GalleryError::NotFound(id),
        _ => {
            let message = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|value| {
                    ["error", "message"].into_iter().find_map(|key| {
                        value.get(key).and_then(Value::as_str).map(str::to_string)
                    })
                })
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| {
                    if body.trim().is_empty() {
                        fallback.to_string()
                    } else {
                        format!("{} ({})", truncate_text(body.trim(), 200), status.as_u16())
                    }
                });
            GalleryError::Rejected(message)
        }
    }
}

/// The save function may answer with the row, a one-row array, or the row
/// wrapped under `avatar`/`data`.
fn saved_avatar_from_body(body: &str) -> Result<SavedAvatar, GalleryError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| GalleryError::InvalidResponse(err.to_string()))?;
    let row = match &value {
        Value::Array(rows) => rows.first().cloned(),
        Value::Object(map) => map
            .get("avatar")
            .or_else(|| map.get("data"))
            .map(|inner| match inner {
                Value::Array(rows) => rows.first().cloned().unwrap_or(Value::Null),
                other => other.clone(),
            })
            .or_else(|| Some(value.clone())),
        _ => None,
    }
    .ok_or_else(|| GalleryError::InvalidResponse("empty save response".to_string()))?;
    serde_json::from_value(row).map_err(|err| GalleryError::InvalidResponse(err.to_string()))
}

/// In-process gallery with the backend's ownership rules, for tests and
/// offline use.
#[derive(Debug, Default)]
pub struct MemoryGallery {
    user: Option<String>,
    state: Mutex<MemoryGalleryState>,
}

#[derive(Debug, Default)]
struct MemoryGalleryState {
    rows: Vec<SavedAvatar>,
    next_id: i64,
}

impl MemoryGallery {
    pub fn signed_in(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            state: Mutex::default(),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Inserts a row as another user would have, bypassing the signed-in user.
    pub fn insert_row(&self, row: SavedAvatar) -> Result<(), GalleryError> {
        let mut state = self.lock()?;
        state.next_id = state.next_id.max(row.id);
        state.rows.push(row);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryGalleryState>, GalleryError> {
        self.state
            .lock()
            .map_err(|_| GalleryError::Network("memory gallery lock poisoned".to_string()))
    }
}

impl GalleryStore for MemoryGallery {
    fn list(&self, owner: &str) -> Result<Vec<SavedAvatar>, GalleryError> {
        if self.user.is_none() {
            return Err(GalleryError::Unauthenticated);
        }
        let state = self.lock()?;
        let mut rows: Vec<SavedAvatar> = state
            .rows
            .iter()
            .filter(|row| row.owner.as_deref() == Some(owner))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    fn delete(&self, id: i64) -> Result<(), GalleryError> {
        let user = self.user.as_deref().ok_or(GalleryError::Unauthenticated)?;
        let mut state = self.lock()?;
        let Some(position) = state.rows.iter().position(|row| row.id == id) else {
            return Err(GalleryError::NotFound(id));
        };
        if state.rows[position].owner.as_deref() != Some(user) {
            return Err(GalleryError::Forbidden);
        }
        state.rows.remove(position);
        Ok(())
    }

    fn save(&self, svg: &str) -> Result<SavedAvatar, GalleryError> {
        let user = self.user.as_deref().ok_or(GalleryError::Unauthenticated)?;
        if svg.trim().is_empty() {
            return Err(GalleryError::Rejected("SVG content is required".to_string()));
        }
        let mut state = self.lock()?;
        state.next_id += 1;
        let row = SavedAvatar {
            id: state.next_id,
            svg: svg.to_string(),
            created_at: Utc::now(),
            owner: Some(user.to_string()),
        };
        state.rows.push(row.clone());
        Ok(row)
    }
}

/// Gallery screen state. Contents are fetched on every activation and never
/// cached across activations.
pub struct GalleryView<G: GalleryStore> {
    store: G,
    owner: String,
    avatars: Vec<SavedAvatar>,
    last_error: Option<String>,
    events: Option<EventWriter>,
}

impl<G: GalleryStore> GalleryView<G> {
    pub fn new(store: G, owner: impl Into<String>, events: Option<EventWriter>) -> Self {
        Self {
            store,
            owner: owner.into(),
            avatars: Vec::new(),
            last_error: None,
            events,
        }
    }

    pub fn avatars(&self) -> &[SavedAvatar] {
        &self.avatars
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn refresh(&mut self) -> Result<&[SavedAvatar], GalleryError> {
        match self.store.list(&self.owner) {
            Ok(avatars) => {
                self.avatars = avatars;
                self.last_error = None;
                Ok(&self.avatars)
            }
            Err(err) => Err(self.fail("list", err)),
        }
    }

    /// Deletes a displayed avatar. Ids not in the current list are reported
    /// as not found without touching the store; the list only changes when
    /// the store confirms the delete.
    pub fn delete(&mut self, id: i64) -> Result<(), GalleryError> {
        if !self.avatars.iter().any(|avatar| avatar.id == id) {
            return Err(self.fail("delete", GalleryError::NotFound(id)));
        }
        match self.store.delete(id) {
            Ok(()) => {
                self.avatars.retain(|avatar| avatar.id != id);
                self.last_error = None;
                Ok(())
            }
            Err(err) => Err(self.fail("delete", err)),
        }
    }

    pub fn save(&mut self, svg: &str) -> Result<SavedAvatar, GalleryError> {
        self.store.save(svg).map_err(|err| self.fail("save", err))
    }

    pub fn download(&self, id: i64, dir: &Path) -> anyhow::Result<PathBuf> {
        let avatar = self
            .avatars
            .iter()
            .find(|avatar| avatar.id == id)
            .ok_or(GalleryError::NotFound(id))?;
        write_svg(dir, &avatar.file_name(), &avatar.svg)
    }

    fn fail(&mut self, op: &str, err: GalleryError) -> GalleryError {
        self.last_error = Some(err.to_string());
        emit_event(
            self.events.as_ref(),
            EventKind::GalleryOperationFailed,
            payload(json!({ "op": op, "error": err.to_string() })),
        );
        err
    }
}

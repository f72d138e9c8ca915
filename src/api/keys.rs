use askama::Template;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::error::{AppError, Result};
use crate::models::{
    license_key::deserialize_optional_issued_date, KeyRecord, KeyStatus,
};
use crate::services::{key_admin, key_issuer};

#[derive(Template)]
#[template(path = "keys.html")]
pub struct KeysPageTemplate {
    keys: Vec<KeyRow>,
    bound_count: usize,
}

/// Display form of a record for the admin page
struct KeyRow {
    key: String,
    issued: String,
    status: String,
    hwid: String,
    activated: String,
}

impl From<&KeyRecord> for KeyRow {
    fn from(record: &KeyRecord) -> Self {
        Self {
            key: record.key.clone(),
            issued: record.issued_date.format("%Y-%m-%d %H:%M UTC").to_string(),
            status: record.status.to_string(),
            hwid: record.hwid.clone().unwrap_or_else(|| "-".to_string()),
            activated: record
                .activated_at
                .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveKeyRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default, deserialize_with = "deserialize_optional_issued_date")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<KeyStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveKeyResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: KeyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdateResponse {
    pub success: bool,
    pub changed: bool,
    pub key: KeyRecord,
}

/// Admin page listing every key
async fn keys_page(State(state): State<AppState>) -> Result<KeysPageTemplate> {
    let records = state.store.list().await?;

    Ok(KeysPageTemplate {
        bound_count: records.iter().filter(|r| r.is_bound()).count(),
        keys: records.iter().map(KeyRow::from).collect(),
    })
}

async fn list_keys(State(state): State<AppState>) -> Result<Json<Vec<KeyRecord>>> {
    let records = state.store.list().await?;
    Ok(Json(records))
}

async fn save_key(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SaveKeyRequest>, JsonRejection>,
) -> Result<Json<SaveKeyResponse>> {
    let Json(payload) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    key_issuer::issue_key(
        &state.store,
        key_issuer::IssueKeyRequest {
            key: payload.key,
            issued_date: payload.date.unwrap_or_else(Utc::now),
            status: payload.status.unwrap_or_default(),
        },
    )
    .await?;

    Ok(Json(SaveKeyResponse { success: true }))
}

async fn update_status(
    State(state): State<AppState>,
    Path(key): Path<String>,
    payload: std::result::Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<StatusUpdateResponse>> {
    let Json(payload) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let change = key_admin::set_key_status(
        &state.store,
        &key,
        payload.status,
        state.config.activation_retry_limit,
    )
    .await?;

    Ok(Json(StatusUpdateResponse {
        success: true,
        changed: change.changed,
        key: change.record,
    }))
}

/// Routes that require the admin token (when one is configured)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(keys_page))
        .route("/key-list", get(list_keys))
        .route("/save-key", post(save_key))
        .route("/api/keys/:key/status", put(update_status))
}

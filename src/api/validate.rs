use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::error::{AppError, Result};
use crate::services::activation::{self, ActivationOutcome};

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub hwid: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new_activation: Option<bool>,
}

impl From<ActivationOutcome> for ValidateResponse {
    fn from(outcome: ActivationOutcome) -> Self {
        match outcome {
            ActivationOutcome::Activated {
                new_activation: true,
                ..
            } => ValidateResponse {
                success: true,
                message: "Key activated with this hardware".to_string(),
                is_new_activation: Some(true),
            },
            ActivationOutcome::Activated { .. } => ValidateResponse {
                success: true,
                message: "Valid key (HWID matches)".to_string(),
                is_new_activation: Some(false),
            },
            ActivationOutcome::Rejected(reason) => ValidateResponse {
                success: false,
                message: reason.message().to_string(),
                is_new_activation: None,
            },
            ActivationOutcome::NotFound => ValidateResponse {
                success: false,
                message: "Key not found".to_string(),
                is_new_activation: None,
            },
        }
    }
}

/// Client activation check.
///
/// Business outcomes (unknown key, inactive key, other hardware) are reported
/// with `success: false` and a 200 status; only malformed requests and server
/// failures use error statuses.
async fn validate_key(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<ValidateResponse>> {
    let Json(payload) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let hwid = payload
        .hwid
        .as_deref()
        .filter(|hwid| !hwid.trim().is_empty())
        .ok_or_else(|| AppError::Validation("hwid is required".to_string()))?;

    let outcome = activation::activate_key(
        &state.store,
        &payload.key,
        hwid,
        state.config.activation_retry_limit,
    )
    .await?;

    Ok(Json(ValidateResponse::from(outcome)))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/validate", post(validate_key))
}

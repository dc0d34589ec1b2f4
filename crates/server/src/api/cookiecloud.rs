use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use common::Identity;
use serde::{Deserialize, Serialize};

use crate::state::{AppState, AuthContext};
use crate::utils::{json_error, ErrorResponse};

#[derive(Serialize)]
pub struct ServerResponse {
    pub url: String,
}

pub async fn get_server(State(state): State<AppState>) -> Json<ServerResponse> {
    Json(ServerResponse {
        url: state.config.read().cookiecloud.url.clone(),
    })
}

#[derive(Deserialize)]
pub struct IdentityRequest {
    /// The CookieCloud user key (uuid).
    pub key: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct IdentityResponse {
    pub username: String,
    pub key: String,
}

/// Upserts the caller's CookieCloud identity; the server URL comes from
/// configuration.
pub async fn put_identity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<IdentityRequest>,
) -> Result<Json<IdentityResponse>, (StatusCode, Json<ErrorResponse>)> {
    if request.key.trim().is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "key is required"));
    }
    let identity = Identity {
        username: auth.username.clone(),
        uuid: request.key.trim().to_string(),
        password: request.password,
        url: state.config.read().cookiecloud.url.clone(),
    };
    state
        .library
        .upsert_identity(&identity)
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(Json(IdentityResponse {
        username: identity.username,
        key: identity.uuid,
    }))
}

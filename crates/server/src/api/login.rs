use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::issue_token;
use crate::state::AppState;
use crate::utils::{json_error, ErrorResponse};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Exchanges credentials for a 24-hour HS256 bearer token. A successful
/// login against a legacy clear-text password upgrades it to the
/// encrypted form in place.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = state
        .library
        .user(&request.username)
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "invalid credentials"))?;

    let stored = state
        .secrets
        .reveal_password(&user.password)
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    if stored != request.password {
        return Err(json_error(StatusCode::UNAUTHORIZED, "invalid credentials"));
    }

    if !user.password.starts_with("enc:") {
        match state.secrets.encrypt_password(&stored) {
            Ok(encrypted) => {
                if let Err(err) = state.library.set_user_password(&user.username, &encrypted) {
                    warn!("failed to upgrade password storage: {}", err);
                }
            }
            Err(err) => warn!("failed to encrypt password: {}", err),
        }
    }

    let secret = state
        .secrets
        .jwt_secret()
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    let token = issue_token(&user.username, &secret)
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(Json(LoginResponse { token }))
}

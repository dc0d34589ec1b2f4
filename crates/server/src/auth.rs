use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::state::{AppState, AuthContext};
use crate::utils::json_error_response;

const TOKEN_TTL_SECS: u64 = 60 * 60 * 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
}

pub fn issue_token(username: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let claims = Claims {
        sub: username.to_string(),
        exp: now + TOKEN_TTL_SECS,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// HS256 validation; expiry is checked by the library.
pub fn verify_token(token: &str, secret: &str) -> Option<String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims.sub)
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Management-API guard: a valid bearer JWT puts the username into request
/// extensions; anything else is a 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: axum::http::Request<Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer(req.headers()) {
        Some(token) => token,
        None => return json_error_response(StatusCode::UNAUTHORIZED, "missing token"),
    };
    let secret = match state.secrets.jwt_secret() {
        Ok(secret) => secret,
        Err(err) => {
            return json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("secret error: {}", err),
            )
        }
    };
    match verify_token(&token, &secret) {
        Some(username) => {
            req.extensions_mut().insert(AuthContext { username });
            next.run(req).await
        }
        None => json_error_response(StatusCode::UNAUTHORIZED, "invalid or expired token"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let token = issue_token("alice", "secret").unwrap();
        assert_eq!(verify_token(&token, "secret"), Some("alice".to_string()));
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = issue_token("alice", "secret").unwrap();
        assert_eq!(verify_token(&token, "other"), None);
    }

    #[test]
    fn garbage_token_rejected() {
        assert_eq!(verify_token("not.a.jwt", "secret"), None);
    }
}

use std::path::PathBuf;
use std::time::Duration;

use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::cookiecloud::{build_cookie_jar, CookieCloudClient};
use crate::platform::{downloader, ConflictPolicy, QualityLevel, TrackResult};
use crate::state::{AppState, AuthContext};
use crate::subsonic::SubsonicParams;
use crate::utils::{json_error, ErrorResponse};

const DEFAULT_TIMEOUT_MS: u64 = 60_000;

#[derive(Serialize)]
pub struct DownloadResponse {
    pub tracks: Vec<TrackResult>,
}

/// Builds an HTTP client carrying the caller's platform cookies, pulled
/// from their CookieCloud identity.
async fn platform_client(
    state: &AppState,
    username: &str,
) -> Result<Client, (StatusCode, Json<ErrorResponse>)> {
    let identity = state
        .library
        .identity(username)
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
        .ok_or_else(|| {
            json_error(
                StatusCode::BAD_REQUEST,
                "no cookiecloud identity configured for this user",
            )
        })?;
    let url = if identity.url.is_empty() {
        state.config.read().cookiecloud.url.clone()
    } else {
        identity.url.clone()
    };
    if url.is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "cookiecloud server is not configured",
        ));
    }

    let cc = CookieCloudClient::new(state.http.clone(), &url, &identity.uuid, &identity.password);
    let cookies = cc
        .pull()
        .await
        .map_err(|err| json_error(StatusCode::BAD_GATEWAY, err.to_string()))?;
    let jar = build_cookie_jar(&cookies);
    Client::builder()
        .cookie_provider(jar)
        .user_agent("Mozilla/5.0 (mezzo)")
        .build()
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
}

/// GET /api/download?uri=...&uri=...&level=lossless&output=...&timeout=...
/// &conflict_policy=skip&platform=netease
pub async fn download(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    RawQuery(query): RawQuery,
) -> Result<Json<DownloadResponse>, (StatusCode, Json<ErrorResponse>)> {
    let params = SubsonicParams::parse(query.as_deref(), "");

    let uris: Vec<String> = params
        .get_all("uri")
        .into_iter()
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if uris.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "uri is required"));
    }

    let level = match params.get("level") {
        None => QualityLevel::Lossless,
        Some(value) => QualityLevel::parse(value)
            .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "unknown level"))?,
    };
    let policy = match params.get("conflict_policy") {
        None => ConflictPolicy::Skip,
        Some(value) => ConflictPolicy::parse(value)
            .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "unknown conflict_policy"))?,
    };
    let timeout_ms = params
        .get("timeout")
        .map(|v| v.parse::<u64>())
        .transpose()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid timeout"))?
        .unwrap_or(DEFAULT_TIMEOUT_MS);
    let output = params
        .get("output")
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            let configured = state.config.read().platform.download_dir.clone();
            (!configured.is_empty()).then_some(configured)
        })
        .map(PathBuf::from);

    let provider = state
        .registry
        .get(params.get("platform"))
        .map_err(|err| json_error(StatusCode::BAD_REQUEST, err.to_string()))?;

    let client = platform_client(&state, &auth.username).await?;

    let work = async {
        let tracks = provider
            .resolve(&client, &uris, level)
            .await
            .map_err(|err| json_error(StatusCode::BAD_GATEWAY, err.to_string()))?;
        info!(
            "resolved {} track(s) from {} uri(s) for {}",
            tracks.len(),
            uris.len(),
            auth.username
        );
        Ok::<Vec<TrackResult>, (StatusCode, Json<ErrorResponse>)>(
            downloader::download_tracks(&client, tracks, output, policy).await,
        )
    };

    // timeout=0 disables the deadline.
    let tracks = if timeout_ms == 0 {
        work.await?
    } else {
        tokio::time::timeout(Duration::from_millis(timeout_ms), work)
            .await
            .map_err(|_| json_error(StatusCode::GATEWAY_TIMEOUT, "download timed out"))??
    };

    Ok(Json(DownloadResponse { tracks }))
}

pub async fn platform_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(platform): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let provider = state
        .registry
        .get(Some(&platform))
        .map_err(|err| json_error(StatusCode::BAD_REQUEST, err.to_string()))?;
    let client = platform_client(&state, &auth.username).await?;
    let profile = provider
        .profile(&client)
        .await
        .map_err(|err| json_error(StatusCode::BAD_GATEWAY, err.to_string()))?;
    Ok(Json(serde_json::to_value(profile).unwrap_or_default()))
}

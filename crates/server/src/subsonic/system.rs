use common::User;
use serde_json::json;
use tracing::warn;

use crate::state::AppState;
use crate::utils::iso_datetime;

use super::response::{License, ScanStatusResponse, UserResponse};
use super::{Outcome, SubsonicError, SubsonicParams};

pub fn get_license() -> Result<Outcome, SubsonicError> {
    let license = License { valid: true };
    Outcome::payload("license", serde_json::to_value(license).unwrap_or_default())
}

pub fn get_user(
    state: &AppState,
    params: &SubsonicParams,
    requester: &User,
) -> Result<Outcome, SubsonicError> {
    let username = params.get("username").unwrap_or(&requester.username);
    if username != requester.username && !requester.is_admin {
        return Err(SubsonicError::permission_denied());
    }
    let user = state
        .library
        .user(username)?
        .ok_or_else(SubsonicError::not_found)?;
    let folders = state
        .library
        .music_folders()?
        .into_iter()
        .map(|f| f.id)
        .collect();
    Outcome::payload(
        "user",
        serde_json::to_value(UserResponse::from_user(&user, folders)).unwrap_or_default(),
    )
}

/// Kicks a scan off in the background; a scan already in flight collapses
/// into the running one.
pub fn start_scan(state: &AppState) -> Result<Outcome, SubsonicError> {
    let scanner = state.scanner.clone();
    let incremental = state.config.read().incremental_scan();
    tokio::task::spawn_blocking(move || {
        if let Err(err) = scanner.scan_all(incremental) {
            warn!("scan failed: {}", err);
        }
    });
    scan_status_payload(state)
}

pub fn get_scan_status(state: &AppState) -> Result<Outcome, SubsonicError> {
    scan_status_payload(state)
}

fn scan_status_payload(state: &AppState) -> Result<Outcome, SubsonicError> {
    let last = state.scanner.last_scan_time();
    let status = ScanStatusResponse {
        scanning: state.scanner.is_scanning(),
        count: state.scanner.scan_count(),
        last_scan: (last > 0).then(|| iso_datetime(last)),
    };
    Outcome::payload(
        "scanStatus",
        serde_json::to_value(status).unwrap_or_else(|_| json!({})),
    )
}

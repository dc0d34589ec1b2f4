use std::path::{Path as FsPath, PathBuf};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use metadata::TagWrite;
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::utils::{json_error, ErrorResponse};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[derive(Serialize)]
pub struct FolderEntry {
    pub id: i64,
    pub name: String,
    pub path: String,
}

pub async fn list_folders(State(state): State<AppState>) -> ApiResult<Vec<FolderEntry>> {
    let folders = state
        .library
        .music_folders()
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(Json(
        folders
            .into_iter()
            .map(|f| FolderEntry {
                id: f.id,
                name: f.name,
                path: f.path,
            })
            .collect(),
    ))
}

#[derive(Deserialize)]
pub struct DirectoryQuery {
    pub path: String,
}

#[derive(Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Management directory listing works on real filesystem paths, but only
/// beneath a configured music folder.
pub async fn list_directory(
    State(state): State<AppState>,
    Query(query): Query<DirectoryQuery>,
) -> ApiResult<Vec<DirectoryEntry>> {
    let path = ensure_under_folder(&state, &query.path)?;
    let mut reader = tokio::fs::read_dir(&path)
        .await
        .map_err(|err| json_error(StatusCode::NOT_FOUND, err.to_string()))?;
    let mut entries = Vec::new();
    while let Ok(Some(entry)) = reader.next_entry().await {
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        entries.push(DirectoryEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            path: entry.path().to_string_lossy().to_string(),
            is_dir: meta.is_dir(),
            size: meta.len(),
        });
    }
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(Json(entries))
}

#[derive(Serialize)]
pub struct SongTags {
    pub path: String,
    pub title: Option<String>,
    pub artists: Vec<String>,
    pub album_artists: Vec<String>,
    pub album: Option<String>,
    pub track: Option<u32>,
    pub disc: Option<u32>,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub lyrics: Option<String>,
    pub duration: Option<u32>,
    pub bitrate: Option<u32>,
    pub has_cover: bool,
}

pub async fn read_song_tags(
    State(state): State<AppState>,
    Query(query): Query<DirectoryQuery>,
) -> ApiResult<SongTags> {
    let path = ensure_under_folder(&state, &query.path)?;
    let tags = tokio::task::spawn_blocking(move || metadata::read_tags(&path))
        .await
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
        .map_err(|err| json_error(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()))?;
    Ok(Json(SongTags {
        path: query.path,
        title: tags.title,
        artists: tags.artists,
        album_artists: tags.album_artists,
        album: tags.album,
        track: tags.track_no,
        disc: tags.disc_no,
        year: tags.year,
        genres: tags.genres,
        lyrics: tags.lyrics,
        duration: tags.duration_secs,
        bitrate: tags.bitrate_kbps,
        has_cover: tags.cover.is_some(),
    }))
}

#[derive(Deserialize)]
pub struct WriteTagsRequest {
    pub path: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub album_artists: Vec<String>,
    #[serde(default)]
    pub track: Option<u32>,
    #[serde(default)]
    pub disc: Option<u32>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub lyrics: Option<String>,
}

#[derive(Serialize)]
pub struct WriteTagsResponse {
    pub path: String,
    pub updated_in_catalog: bool,
}

/// Writes tags to the file, then re-reads them through the scanner so the
/// catalog (and aggregates) follow.
pub async fn write_song_tags(
    State(state): State<AppState>,
    Json(request): Json<WriteTagsRequest>,
) -> ApiResult<WriteTagsResponse> {
    let path = ensure_under_folder(&state, &request.path)?;
    let write = TagWrite {
        title: request.title.clone(),
        artists: request.artists.clone(),
        album: request.album.clone(),
        album_artists: request.album_artists.clone(),
        track_no: request.track,
        disc_no: request.disc,
        year: request.year,
        genres: request.genres.clone(),
        lyrics: request.lyrics.clone(),
        cover: None,
    };
    let write_path = path.clone();
    tokio::task::spawn_blocking(move || metadata::write_tags(&write_path, &write))
        .await
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
        .map_err(|err| json_error(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()))?;

    let mut updated = false;
    let child = state
        .library
        .child_by_path(&path.to_string_lossy())
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    if let Some(child) = child {
        let scanner = state.scanner.clone();
        let id = child.id.clone();
        tokio::task::spawn_blocking(move || scanner.update_song_metadata(&id))
            .await
            .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
            .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
        updated = true;
    }

    Ok(Json(WriteTagsResponse {
        path: request.path,
        updated_in_catalog: updated,
    }))
}

#[derive(Deserialize)]
pub struct RescanQuery {
    /// Directory id for a targeted subtree rescan; absent means all
    /// configured roots.
    pub id: Option<String>,
    #[serde(default)]
    pub full: bool,
}

#[derive(Serialize)]
pub struct RescanResponse {
    pub started: bool,
    pub scanning: bool,
}

pub async fn rescan(
    State(state): State<AppState>,
    Query(query): Query<RescanQuery>,
) -> ApiResult<RescanResponse> {
    if state.scanner.is_scanning() {
        return Ok(Json(RescanResponse {
            started: false,
            scanning: true,
        }));
    }
    let scanner = state.scanner.clone();
    let incremental = !query.full && state.config.read().incremental_scan();
    tokio::task::spawn_blocking(move || {
        let result = match &query.id {
            Some(id) => scanner.scan_by_id(id),
            None => scanner.scan_all(incremental),
        };
        if let Err(err) = result {
            tracing::warn!("rescan failed: {}", err);
        }
    });
    Ok(Json(RescanResponse {
        started: true,
        scanning: true,
    }))
}

#[derive(Serialize)]
pub struct CoverUploadResponse {
    pub id: String,
    pub size: usize,
}

pub async fn upload_cover(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<CoverUploadResponse> {
    if body.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "empty body"));
    }
    let scanner = state.scanner.clone();
    let blob_id = id.clone();
    let bytes = body.to_vec();
    let size = bytes.len();
    tokio::task::spawn_blocking(move || scanner.save_cover_art(&blob_id, &bytes))
        .await
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(Json(CoverUploadResponse { id, size }))
}

/// Rejects paths that escape every configured music folder.
fn ensure_under_folder(
    state: &AppState,
    raw: &str,
) -> Result<PathBuf, (StatusCode, Json<ErrorResponse>)> {
    let path = PathBuf::from(raw);
    if !path.is_absolute() {
        return Err(json_error(StatusCode::BAD_REQUEST, "path must be absolute"));
    }
    if raw.split('/').any(|part| part == "..") {
        return Err(json_error(StatusCode::BAD_REQUEST, "path must not contain '..'"));
    }
    let folders = state
        .library
        .music_folders()
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    let allowed = folders
        .iter()
        .any(|folder| path.starts_with(FsPath::new(&folder.path)));
    if !allowed {
        return Err(json_error(
            StatusCode::FORBIDDEN,
            "path is outside every music folder",
        ));
    }
    Ok(path)
}

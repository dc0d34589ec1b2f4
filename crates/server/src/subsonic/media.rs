use std::io::SeekFrom;

use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use tokio::io::AsyncSeekExt;
use tokio_util::io::ReaderStream;

use crate::range::{parse_range_header, RangeError};
use crate::state::AppState;

use super::response::LyricsResponse;
use super::{Outcome, SubsonicError, SubsonicParams};

/// stream and download share the file-serving path; download adds the
/// attachment disposition and ignores ranges from clients that send none.
pub async fn stream(
    state: &AppState,
    params: &SubsonicParams,
    headers: &HeaderMap,
    attachment: bool,
) -> Result<Outcome, SubsonicError> {
    let id = params.require("id")?;
    let child = state
        .library
        .child(id)?
        .filter(|c| !c.is_dir)
        .ok_or_else(SubsonicError::not_found)?;

    let file = tokio::fs::File::open(&child.path)
        .await
        .map_err(|err| SubsonicError::generic(format!("cannot open file: {}", err)))?;
    let size = file
        .metadata()
        .await
        .map(|m| m.len())
        .unwrap_or(child.size);

    let content_type = if child.content_type.is_empty() {
        mime_guess::from_path(&child.path)
            .first_or_octet_stream()
            .to_string()
    } else {
        child.content_type.clone()
    };

    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes");
    if attachment {
        let filename = std::path::Path::new(&child.path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{}.{}", child.title, child.suffix));
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename.replace('"', "")),
        );
    }

    let response = match range_header.as_deref() {
        Some(value) => match parse_range_header(value, size) {
            Ok(range) => {
                let mut file = file;
                file.seek(SeekFrom::Start(range.start)).await.map_err(|err| {
                    SubsonicError::generic(format!("seek failed: {}", err))
                })?;
                let limited = tokio::io::AsyncReadExt::take(file, range.len());
                builder
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(header::CONTENT_RANGE, range.content_range(size))
                    .header(header::CONTENT_LENGTH, range.len())
                    .body(Body::from_stream(ReaderStream::new(limited)))
            }
            Err(RangeError::Unsatisfiable) => builder
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{}", size))
                .body(Body::empty()),
            Err(RangeError::Invalid) => builder
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, size)
                .body(Body::from_stream(ReaderStream::new(file))),
        },
        None => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, size)
            .body(Body::from_stream(ReaderStream::new(file))),
    };

    Ok(Outcome::Raw(response.unwrap_or_default()))
}

/// Serves a blob from the cover cache; ids are album or song ids.
pub async fn get_cover_art(
    state: &AppState,
    params: &SubsonicParams,
) -> Result<Outcome, SubsonicError> {
    let id = params.require("id")?;
    let bytes = state
        .library
        .read_cover_blob(id)?
        .ok_or_else(SubsonicError::not_found)?;
    let content_type = if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        "image/png"
    } else {
        "image/jpeg"
    };
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes))
        .unwrap_or_default();
    Ok(Outcome::Raw(response))
}

/// Looks lyrics up by artist and title, mirroring the legacy endpoint.
pub fn get_lyrics(state: &AppState, params: &SubsonicParams) -> Result<Outcome, SubsonicError> {
    let artist = params.get("artist");
    let title = params.get("title");
    let query = title.or(artist).unwrap_or_default();
    if query.is_empty() {
        return Err(SubsonicError::missing_param("title"));
    }

    let results = state.library.search(query, library::SearchOffsets::default())?;
    let song = results.songs.iter().find(|song| {
        let title_matches = title
            .map(|t| song.title.eq_ignore_ascii_case(t))
            .unwrap_or(true);
        let artist_matches = artist
            .map(|a| song.artist.to_lowercase().contains(&a.to_lowercase()))
            .unwrap_or(true);
        title_matches && artist_matches && !song.lyrics.is_empty()
    });

    let payload = LyricsResponse {
        artist: artist.map(|s| s.to_string()),
        title: title.map(|s| s.to_string()),
        value: song.map(|s| s.lyrics.clone()).unwrap_or_default(),
    };
    Outcome::payload("lyrics", serde_json::to_value(payload).unwrap_or_default())
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use metadata::{CoverArt, TagWrite};
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::{ConflictPolicy, TrackResult, TrackSource};

/// At most this many tracks are in flight per download request.
const CONCURRENT_DOWNLOADS: usize = 5;

/// Downloads every track concurrently, verifies integrity, applies the
/// conflict policy, and tags what was written. One track's failure never
/// aborts the others.
pub async fn download_tracks(
    client: &Client,
    tracks: Vec<TrackSource>,
    output_dir: Option<PathBuf>,
    policy: ConflictPolicy,
) -> Vec<TrackResult> {
    let semaphore = Arc::new(Semaphore::new(CONCURRENT_DOWNLOADS));
    let mut handles = Vec::with_capacity(tracks.len());
    for track in tracks {
        let client = client.clone();
        let output_dir = output_dir.clone();
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await;
            download_one(&client, &track, output_dir.as_deref(), policy).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(err) => warn!("download task panicked: {}", err),
        }
    }
    results
}

async fn download_one(
    client: &Client,
    track: &TrackSource,
    output_dir: Option<&Path>,
    policy: ConflictPolicy,
) -> TrackResult {
    let mut result = TrackResult {
        title: track.title.clone(),
        url: track.url.clone(),
        file_type: track.file_type.clone(),
        size: track.size,
        quality: track.quality.clone(),
        path: None,
        error: None,
    };

    match fetch_and_verify(client, track).await {
        Ok(bytes) => {
            result.size = bytes.len() as u64;
            if let Some(dir) = output_dir {
                match place_file(client, track, dir, policy, &bytes).await {
                    Ok(path) => result.path = path.map(|p| p.to_string_lossy().to_string()),
                    Err(err) => result.error = Some(err),
                }
            }
        }
        Err(err) => result.error = Some(err),
    }
    result
}

/// Streams the track and checks the server-reported MD5; a mismatch means
/// the bytes are discarded.
async fn fetch_and_verify(client: &Client, track: &TrackSource) -> Result<Vec<u8>, String> {
    let response = client
        .get(&track.url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|err| format!("download failed: {}", err))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|err| format!("download failed: {}", err))?;

    if !track.md5.is_empty() {
        let computed = common::md5_hex_bytes(&bytes);
        if computed != track.md5 {
            return Err(format!(
                "md5 not match: expected {}, got {}",
                track.md5, computed
            ));
        }
    }
    Ok(bytes.to_vec())
}

async fn place_file(
    client: &Client,
    track: &TrackSource,
    dir: &Path,
    policy: ConflictPolicy,
    bytes: &[u8],
) -> Result<Option<PathBuf>, String> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| format!("cannot create output dir: {}", err))?;

    let base_name = track_file_name(track);
    let target = dir.join(&base_name);
    let exists = tokio::fs::try_exists(&target).await.unwrap_or(false);

    let write_to = if exists {
        match policy {
            ConflictPolicy::Skip => {
                debug!("skipping existing file {:?}", target);
                return Ok(Some(target));
            }
            ConflictPolicy::Overwrite => target,
            ConflictPolicy::Rename => next_free_name(dir, track).await,
            ConflictPolicy::UpdateTags => {
                let write = tag_write_for(client, track).await;
                tokio::task::block_in_place(|| metadata::write_tags(&target, &write))
                    .map_err(|err| format!("tag update failed: {}", err))?;
                return Ok(Some(target));
            }
        }
    } else {
        target
    };

    tokio::fs::write(&write_to, bytes)
        .await
        .map_err(|err| format!("write failed: {}", err))?;

    let write = tag_write_for(client, track).await;
    if let Err(err) = tokio::task::block_in_place(|| metadata::write_tags(&write_to, &write)) {
        warn!("tagging failed for {:?}: {}", write_to, err);
    }
    Ok(Some(write_to))
}

/// `Artist - Title.ext` with filesystem-hostile characters stripped.
fn track_file_name(track: &TrackSource) -> String {
    let artist = track
        .artists
        .first()
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string());
    sanitize(&format!(
        "{} - {}.{}",
        artist, track.title, track.file_type
    ))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

/// `Artist - Title (1).ext`, `(2)`, ... for the rename policy.
async fn next_free_name(dir: &Path, track: &TrackSource) -> PathBuf {
    let artist = track
        .artists
        .first()
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string());
    let stem = sanitize(&format!("{} - {}", artist, track.title));
    for counter in 1.. {
        let candidate = dir.join(format!("{} ({}).{}", stem, counter, track.file_type));
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
    }
    unreachable!("counter space exhausted")
}

async fn tag_write_for(client: &Client, track: &TrackSource) -> TagWrite {
    let cover = match &track.cover_url {
        Some(url) => fetch_cover(client, url).await,
        None => None,
    };
    TagWrite {
        title: Some(track.title.clone()),
        artists: track.artists.clone(),
        album: (!track.album.is_empty()).then(|| track.album.clone()),
        album_artists: track.album_artists.clone(),
        track_no: track.track_no,
        disc_no: None,
        year: track.year,
        genres: Vec::new(),
        lyrics: None,
        cover,
    }
}

async fn fetch_cover(client: &Client, url: &str) -> Option<CoverArt> {
    let response = client.get(url).send().await.ok()?.error_for_status().ok()?;
    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let data = response.bytes().await.ok()?;
    Some(CoverArt {
        data: data.to_vec(),
        mime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(title: &str) -> TrackSource {
        TrackSource {
            id: "1".to_string(),
            title: title.to_string(),
            artists: vec!["Artist".to_string()],
            album: "Album".to_string(),
            album_artists: vec!["Artist".to_string()],
            track_no: Some(1),
            year: Some(2020),
            url: "https://example.invalid/track".to_string(),
            size: 0,
            md5: String::new(),
            file_type: "mp3".to_string(),
            quality: "lossless".to_string(),
            cover_url: None,
        }
    }

    #[test]
    fn file_names_are_sanitized() {
        let mut t = track("What: A/Title?");
        t.artists = vec!["AC/DC".to_string()];
        assert_eq!(track_file_name(&t), "AC_DC - What_ A_Title_.mp3");
    }

    #[tokio::test]
    async fn rename_policy_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        let t = track("Title");
        tokio::fs::write(dir.path().join("Artist - Title.mp3"), b"x")
            .await
            .unwrap();
        let next = next_free_name(dir.path(), &t).await;
        assert_eq!(
            next.file_name().unwrap().to_string_lossy(),
            "Artist - Title (1).mp3"
        );

        tokio::fs::write(&next, b"x").await.unwrap();
        let next = next_free_name(dir.path(), &t).await;
        assert_eq!(
            next.file_name().unwrap().to_string_lossy(),
            "Artist - Title (2).mp3"
        );
    }

    #[test]
    fn md5_mismatch_message_is_stable() {
        // The per-track error contract promises this substring.
        let err = format!("md5 not match: expected {}, got {}", "aa", "bb");
        assert!(err.contains("md5 not match"));
    }
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Audio suffixes the scanner indexes. Everything else is ignored.
pub const AUDIO_SUFFIXES: &[&str] = &["mp3", "flac", "m4a", "wav"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MusicFolder {
    pub id: i64,
    pub name: String,
    pub path: String,
}

/// A catalog row for either a directory or a single audio file. The
/// Subsonic protocol uses the same element for both, so the optional song
/// fields stay empty on directory rows.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Child {
    pub id: String,
    pub parent: String,
    pub is_dir: bool,
    pub title: String,
    pub path: String,
    pub size: u64,
    pub suffix: String,
    pub content_type: String,
    pub music_folder_id: i64,
    /// Seconds since epoch; mirrors the file mtime on every upsert.
    pub created: i64,
    pub album: String,
    pub artist: String,
    pub genre: String,
    pub track: Option<u32>,
    pub disc: Option<u32>,
    pub year: Option<i32>,
    pub duration: Option<u32>,
    pub bitrate: Option<u32>,
    pub album_id: String,
    pub artist_id: String,
    pub cover_art: String,
    pub lyrics: String,
    pub starred: Option<i64>,
    pub user_rating: Option<i32>,
    pub play_count: i64,
    pub last_played: Option<i64>,
    pub media_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub cover_art: Option<String>,
    pub artist_image_url: Option<String>,
    pub starred: Option<i64>,
    pub user_rating: Option<i32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    /// Display string of the credited artist(s), `"; "`-joined.
    pub artist: String,
    pub artist_id: String,
    pub cover_art: Option<String>,
    pub created: i64,
    pub starred: Option<i64>,
    pub user_rating: Option<i32>,
    pub year: Option<i32>,
    pub genre: Option<String>,
}

/// Album stats are aggregated from the album's songs at query time and
/// never stored on the album row.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct AlbumStats {
    pub song_count: u32,
    pub duration: u32,
    pub play_count: i64,
    pub last_played: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub comment: Option<String>,
    pub owner: String,
    pub public: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bookmark {
    pub username: String,
    pub song_id: String,
    /// Playback position in milliseconds.
    pub position: i64,
    pub comment: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayQueue {
    pub username: String,
    pub current: Option<String>,
    pub position: i64,
    pub changed_by: String,
    pub changed_at: i64,
    pub song_ids: Vec<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsonicRoles {
    pub stream: bool,
    pub download: bool,
    pub playlist: bool,
    pub cover_art: bool,
    pub comment: bool,
    pub share: bool,
    pub scrobbling: bool,
    pub max_bit_rate: u32,
}

impl Default for SubsonicRoles {
    fn default() -> Self {
        Self {
            stream: true,
            download: true,
            playlist: true,
            cover_art: true,
            comment: true,
            share: false,
            scrobbling: true,
            max_bit_rate: 0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// Clear text or `enc:`-prefixed AES-GCM ciphertext.
    pub password: String,
    pub email: Option<String>,
    pub is_admin: bool,
    pub roles: SubsonicRoles,
}

/// CookieCloud identity bound to one user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub uuid: String,
    pub password: String,
    pub url: String,
}

pub fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

pub fn md5_hex_bytes(input: &[u8]) -> String {
    format!("{:x}", md5::compute(input))
}

/// Stable id of a directory or file, scoped to its music folder. The
/// relative path is slash-normalized first so ids match across operating
/// systems.
pub fn child_id(folder_id: i64, rel_path: &str) -> String {
    md5_hex(&format!("{}:{}", folder_id, normalize_slashes(rel_path)))
}

pub fn album_id(artist_display: &str, album: &str) -> String {
    md5_hex(&format!("{}|{}", artist_display, album))
}

pub fn artist_id(name: &str) -> String {
    md5_hex(name)
}

/// Id of the parent directory row, or empty when the path sits directly
/// in the folder root.
pub fn parent_id(folder_id: i64, rel_path: &str) -> String {
    let normalized = normalize_slashes(rel_path);
    match normalized.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => child_id(folder_id, dir),
        _ => String::new(),
    }
}

pub fn normalize_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

pub fn join_relpath(root: &Path, relpath: &str) -> PathBuf {
    let mut out = PathBuf::from(root);
    for part in relpath.split('/') {
        if part.is_empty() {
            continue;
        }
        out.push(part);
    }
    out
}

fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}

/// Lowercased audio suffix, or None when the file is not an indexable
/// audio file.
pub fn audio_suffix(path: &Path) -> Option<String> {
    let suffix = path.extension()?.to_str()?.to_ascii_lowercase();
    if AUDIO_SUFFIXES.contains(&suffix.as_str()) {
        Some(suffix)
    } else {
        None
    }
}

pub fn content_type_for(suffix: &str) -> &'static str {
    match suffix {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// Joins multi-valued tag entries into the display form stored on catalog
/// rows.
pub fn join_display(values: &[String]) -> String {
    values.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_id_matches_documented_form() {
        assert_eq!(child_id(1, "album/song.mp3"), md5_hex("1:album/song.mp3"));
    }

    #[test]
    fn child_id_is_stable_across_separators() {
        assert_eq!(
            child_id(1, "album\\song.mp3"),
            child_id(1, "album/song.mp3")
        );
    }

    #[test]
    fn album_id_joins_with_pipe() {
        assert_eq!(album_id("A", "X"), md5_hex("A|X"));
        assert_ne!(album_id("A", "X"), album_id("Various", "X"));
    }

    #[test]
    fn parent_id_is_empty_at_folder_root() {
        assert_eq!(parent_id(1, "song.mp3"), "");
        assert_eq!(parent_id(1, "album/song.mp3"), child_id(1, "album"));
        assert_eq!(
            parent_id(1, "artist/album/song.mp3"),
            child_id(1, "artist/album")
        );
    }

    #[test]
    fn audio_suffix_filters_non_audio() {
        assert_eq!(
            audio_suffix(Path::new("/music/a.MP3")),
            Some("mp3".to_string())
        );
        assert_eq!(
            audio_suffix(Path::new("/music/a.flac")),
            Some("flac".to_string())
        );
        assert_eq!(audio_suffix(Path::new("/music/cover.jpg")), None);
        assert_eq!(audio_suffix(Path::new("/music/noext")), None);
    }

    #[test]
    fn display_join_uses_semicolon_space() {
        let values = vec!["A".to_string(), "B".to_string()];
        assert_eq!(join_display(&values), "A; B");
    }
}

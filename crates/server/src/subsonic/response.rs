use common::{Album, AlbumStats, Artist, Bookmark, Child, MusicFolder, PlayQueue, Playlist, User};
use serde::Serialize;

use crate::nowplaying::NowPlayingEntry;
use crate::utils::iso_datetime;

pub const API_VERSION: &str = "1.16.1";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub valid: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicFolderRef {
    pub id: i64,
    pub name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicFolders {
    pub music_folder: Vec<MusicFolderRef>,
}

impl MusicFolders {
    pub fn from_folders(folders: Vec<MusicFolder>) -> Self {
        Self {
            music_folder: folders
                .into_iter()
                .map(|f| MusicFolderRef {
                    id: f.id,
                    name: f.name,
                })
                .collect(),
        }
    }
}

/// Entry of a getIndexes group; file mode renders top-level directories
/// through the same element.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexArtist {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_rating: Option<i32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub name: String,
    pub artist: Vec<IndexArtist>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Indexes {
    pub last_modified: i64,
    pub ignored_articles: String,
    pub index: Vec<Index>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistID3 {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_art: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_image_url: Option<String>,
    pub album_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_rating: Option<i32>,
}

impl ArtistID3 {
    pub fn from_artist(artist: &Artist, album_count: i64) -> Self {
        Self {
            id: artist.id.clone(),
            name: artist.name.clone(),
            cover_art: artist.cover_art.clone(),
            artist_image_url: artist.artist_image_url.clone(),
            album_count,
            starred: artist.starred.map(iso_datetime),
            user_rating: artist.user_rating,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexID3 {
    pub name: String,
    pub artist: Vec<ArtistID3>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistsID3 {
    pub ignored_articles: String,
    pub index: Vec<IndexID3>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistWithAlbumsID3 {
    #[serde(flatten)]
    pub artist: ArtistID3,
    pub album: Vec<AlbumID3>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumID3 {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub artist_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_art: Option<String>,
    pub song_count: u32,
    pub duration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_count: Option<i64>,
    pub created: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_rating: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

impl AlbumID3 {
    pub fn from_album(album: &Album, stats: &AlbumStats) -> Self {
        Self {
            id: album.id.clone(),
            name: album.name.clone(),
            artist: album.artist.clone(),
            artist_id: album.artist_id.clone(),
            cover_art: album.cover_art.clone(),
            song_count: stats.song_count,
            duration: stats.duration,
            play_count: (stats.play_count > 0).then_some(stats.play_count),
            created: iso_datetime(album.created),
            starred: album.starred.map(iso_datetime),
            user_rating: album.user_rating,
            year: album.year,
            genre: album.genre.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumWithSongsID3 {
    #[serde(flatten)]
    pub album: AlbumID3,
    pub song: Vec<ChildResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub is_dir: bool,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disc_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_art: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_rating: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmark_position: Option<i64>,
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl ChildResponse {
    pub fn from_child(child: &Child) -> Self {
        Self {
            id: child.id.clone(),
            parent: non_empty(&child.parent),
            is_dir: child.is_dir,
            title: child.title.clone(),
            album: non_empty(&child.album),
            artist: non_empty(&child.artist),
            track: child.track,
            disc_number: child.disc,
            year: child.year,
            genre: non_empty(&child.genre),
            cover_art: non_empty(&child.cover_art),
            size: (!child.is_dir).then_some(child.size),
            content_type: non_empty(&child.content_type),
            suffix: non_empty(&child.suffix),
            duration: child.duration,
            bit_rate: child.bitrate,
            path: non_empty(&child.path),
            play_count: (child.play_count > 0).then_some(child.play_count),
            created: (child.created > 0).then(|| iso_datetime(child.created)),
            starred: child.starred.map(iso_datetime),
            album_id: non_empty(&child.album_id),
            artist_id: non_empty(&child.artist_id),
            media_type: (!child.is_dir).then(|| child.media_type.clone()),
            user_rating: child.user_rating,
            bookmark_position: None,
        }
    }

    /// getAlbumList renders albums through the shared child element.
    pub fn from_album(album: &Album, stats: &AlbumStats) -> Self {
        Self {
            id: album.id.clone(),
            parent: non_empty(&album.artist_id),
            is_dir: true,
            title: album.name.clone(),
            album: Some(album.name.clone()),
            artist: non_empty(&album.artist),
            track: None,
            disc_number: None,
            year: album.year,
            genre: album.genre.clone(),
            cover_art: album.cover_art.clone(),
            size: None,
            content_type: None,
            suffix: None,
            duration: Some(stats.duration),
            bit_rate: None,
            path: None,
            play_count: (stats.play_count > 0).then_some(stats.play_count),
            created: Some(iso_datetime(album.created)),
            starred: album.starred.map(iso_datetime),
            album_id: None,
            artist_id: non_empty(&album.artist_id),
            media_type: None,
            user_rating: album.user_rating,
            bookmark_position: None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<String>,
    pub child: Vec<ChildResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumList {
    pub album: Vec<ChildResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumList2 {
    pub album: Vec<AlbumID3>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Songs {
    pub song: Vec<ChildResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenreItem {
    pub song_count: i64,
    pub album_count: i64,
    pub value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Genres {
    pub genre: Vec<GenreItem>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult2 {
    pub artist: Vec<IndexArtist>,
    pub album: Vec<ChildResponse>,
    pub song: Vec<ChildResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult3 {
    pub artist: Vec<ArtistID3>,
    pub album: Vec<AlbumID3>,
    pub song: Vec<ChildResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StarredResponse {
    pub artist: Vec<IndexArtist>,
    pub album: Vec<ChildResponse>,
    pub song: Vec<ChildResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Starred2Response {
    pub artist: Vec<ArtistID3>,
    pub album: Vec<AlbumID3>,
    pub song: Vec<ChildResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistResponse {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub owner: String,
    pub public: bool,
    pub song_count: i64,
    pub duration: i64,
    pub created: String,
    pub changed: String,
}

impl PlaylistResponse {
    pub fn from_playlist(playlist: &Playlist, song_count: i64, duration: i64) -> Self {
        Self {
            id: playlist.id,
            name: playlist.name.clone(),
            comment: playlist.comment.clone(),
            owner: playlist.owner.clone(),
            public: playlist.public,
            song_count,
            duration,
            created: iso_datetime(playlist.created_at),
            changed: iso_datetime(playlist.updated_at),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlists {
    pub playlist: Vec<PlaylistResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistWithSongs {
    #[serde(flatten)]
    pub playlist: PlaylistResponse,
    pub entry: Vec<ChildResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkResponse {
    pub position: i64,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created: String,
    pub changed: String,
    pub entry: ChildResponse,
}

impl BookmarkResponse {
    pub fn from_bookmark(bookmark: &Bookmark, entry: ChildResponse) -> Self {
        Self {
            position: bookmark.position,
            username: bookmark.username.clone(),
            comment: bookmark.comment.clone(),
            created: iso_datetime(bookmark.created_at),
            changed: iso_datetime(bookmark.updated_at),
            entry,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmarks {
    pub bookmark: Vec<BookmarkResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayQueueResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    pub position: i64,
    pub username: String,
    pub changed: String,
    pub changed_by: String,
    pub entry: Vec<ChildResponse>,
}

impl PlayQueueResponse {
    pub fn from_queue(queue: &PlayQueue, entries: Vec<ChildResponse>) -> Self {
        Self {
            current: queue.current.clone(),
            position: queue.position,
            username: queue.username.clone(),
            changed: iso_datetime(queue.changed_at),
            changed_by: queue.changed_by.clone(),
            entry: entries,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlayingEntryResponse {
    #[serde(flatten)]
    pub child: ChildResponse,
    pub username: String,
    pub minutes_ago: u64,
    pub player_id: String,
    pub player_name: String,
}

impl NowPlayingEntryResponse {
    pub fn from_entry(entry: &NowPlayingEntry, child: ChildResponse) -> Self {
        Self {
            child,
            username: entry.username.clone(),
            minutes_ago: entry.minutes_ago(),
            player_id: entry.player_id.clone(),
            player_name: entry.player_name.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlayingResponse {
    pub entry: Vec<NowPlayingEntryResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatusResponse {
    pub scanning: bool,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scan: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub scrobbling_enabled: bool,
    pub admin_role: bool,
    pub settings_role: bool,
    pub stream_role: bool,
    pub download_role: bool,
    pub playlist_role: bool,
    pub cover_art_role: bool,
    pub comment_role: bool,
    pub share_role: bool,
    pub jukebox_role: bool,
    pub podcast_role: bool,
    pub upload_role: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bit_rate: Option<u32>,
    pub folder: Vec<i64>,
}

impl UserResponse {
    pub fn from_user(user: &User, folders: Vec<i64>) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone(),
            scrobbling_enabled: user.roles.scrobbling,
            admin_role: user.is_admin,
            settings_role: user.is_admin,
            stream_role: user.roles.stream,
            download_role: user.roles.download,
            playlist_role: user.roles.playlist,
            cover_art_role: user.roles.cover_art,
            comment_role: user.roles.comment,
            share_role: user.roles.share,
            jukebox_role: false,
            podcast_role: false,
            upload_role: false,
            max_bit_rate: (user.roles.max_bit_rate > 0).then_some(user.roles.max_bit_rate),
            folder: folders,
        }
    }
}

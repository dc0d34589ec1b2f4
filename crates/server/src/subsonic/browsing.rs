use serde_json::json;

use crate::state::AppState;
use crate::utils::iso_datetime;

use super::response::{
    AlbumID3, AlbumWithSongsID3, ArtistID3, ArtistWithAlbumsID3, ArtistsID3, ChildResponse,
    Directory, GenreItem, Genres, Index, IndexArtist, IndexID3, Indexes, MusicFolders,
};
use super::{Outcome, SubsonicError, SubsonicParams};

pub fn get_music_folders(state: &AppState) -> Result<Outcome, SubsonicError> {
    let folders = state.library.music_folders()?;
    Outcome::payload(
        "musicFolders",
        serde_json::to_value(MusicFolders::from_folders(folders)).unwrap_or_default(),
    )
}

/// File-mode indexes: top-level directories bucketed by first letter.
pub fn get_indexes(state: &AppState, params: &SubsonicParams) -> Result<Outcome, SubsonicError> {
    let music_folder = params.get_i64("musicFolderId")?;
    let articles = state.config.read().ignored_article_list();
    let groups = state.library.indexes(music_folder, &articles)?;
    let index = groups
        .into_iter()
        .map(|group| Index {
            name: group.name,
            artist: group
                .entries
                .into_iter()
                .map(|child| IndexArtist {
                    id: child.id,
                    name: child.title,
                    starred: child.starred.map(iso_datetime),
                    user_rating: child.user_rating,
                })
                .collect(),
        })
        .collect();
    let indexes = Indexes {
        last_modified: state.scanner.last_scan_time() * 1000,
        ignored_articles: state.config.read().ignored_articles.clone(),
        index,
    };
    Outcome::payload("indexes", serde_json::to_value(indexes).unwrap_or_default())
}

/// Directory ids, artist ids, and album ids share one namespace; the
/// lookup tries the directory tree first, then the tag-mode entities.
pub fn get_music_directory(
    state: &AppState,
    params: &SubsonicParams,
) -> Result<Outcome, SubsonicError> {
    let id = params.require("id")?;

    if let Some((dir, children)) = state.library.directory(id)? {
        if dir.is_dir {
            let directory = Directory {
                id: dir.id.clone(),
                parent: (!dir.parent.is_empty()).then(|| dir.parent.clone()),
                name: dir.title.clone(),
                starred: dir.starred.map(iso_datetime),
                child: children.iter().map(ChildResponse::from_child).collect(),
            };
            return Outcome::payload(
                "directory",
                serde_json::to_value(directory).unwrap_or_default(),
            );
        }
    }

    if let Some(artist) = state.library.artist(id)? {
        let albums = state.library.artist_albums(&artist.id)?;
        let mut children = Vec::with_capacity(albums.len());
        for album in &albums {
            let stats = state.library.album_stats(&album.id)?;
            children.push(ChildResponse::from_album(album, &stats));
        }
        let directory = Directory {
            id: artist.id.clone(),
            parent: None,
            name: artist.name.clone(),
            starred: artist.starred.map(iso_datetime),
            child: children,
        };
        return Outcome::payload(
            "directory",
            serde_json::to_value(directory).unwrap_or_default(),
        );
    }

    if let Some(album) = state.library.album(id)? {
        let songs = state.library.album_songs(&album.id)?;
        let directory = Directory {
            id: album.id.clone(),
            parent: (!album.artist_id.is_empty()).then(|| album.artist_id.clone()),
            name: album.name.clone(),
            starred: album.starred.map(iso_datetime),
            child: songs.iter().map(ChildResponse::from_child).collect(),
        };
        return Outcome::payload(
            "directory",
            serde_json::to_value(directory).unwrap_or_default(),
        );
    }

    Err(SubsonicError::not_found())
}

pub fn get_artists(state: &AppState) -> Result<Outcome, SubsonicError> {
    let articles = state.config.read().ignored_article_list();
    let groups = state.library.artist_indexes(&articles)?;
    let index = groups
        .into_iter()
        .map(|group| IndexID3 {
            name: group.name,
            artist: group
                .entries
                .iter()
                .map(|(artist, count)| ArtistID3::from_artist(artist, *count))
                .collect(),
        })
        .collect();
    let artists = ArtistsID3 {
        ignored_articles: state.config.read().ignored_articles.clone(),
        index,
    };
    Outcome::payload("artists", serde_json::to_value(artists).unwrap_or_default())
}

pub fn get_artist(state: &AppState, params: &SubsonicParams) -> Result<Outcome, SubsonicError> {
    let id = params.require("id")?;
    let artist = state
        .library
        .artist(id)?
        .ok_or_else(SubsonicError::not_found)?;
    let albums = state.library.artist_albums(&artist.id)?;
    let mut album_responses = Vec::with_capacity(albums.len());
    for album in &albums {
        let stats = state.library.album_stats(&album.id)?;
        album_responses.push(AlbumID3::from_album(album, &stats));
    }
    let payload = ArtistWithAlbumsID3 {
        artist: ArtistID3::from_artist(&artist, albums.len() as i64),
        album: album_responses,
    };
    Outcome::payload("artist", serde_json::to_value(payload).unwrap_or_default())
}

pub fn get_album(state: &AppState, params: &SubsonicParams) -> Result<Outcome, SubsonicError> {
    let id = params.require("id")?;
    let album = state
        .library
        .album(id)?
        .ok_or_else(SubsonicError::not_found)?;
    let songs = state.library.album_songs(&album.id)?;
    let stats = state.library.album_stats(&album.id)?;
    let payload = AlbumWithSongsID3 {
        album: AlbumID3::from_album(&album, &stats),
        song: songs.iter().map(ChildResponse::from_child).collect(),
    };
    Outcome::payload("album", serde_json::to_value(payload).unwrap_or_default())
}

pub fn get_song(state: &AppState, params: &SubsonicParams) -> Result<Outcome, SubsonicError> {
    let id = params.require("id")?;
    let song = state
        .library
        .child(id)?
        .filter(|child| !child.is_dir)
        .ok_or_else(SubsonicError::not_found)?;
    Outcome::payload(
        "song",
        serde_json::to_value(ChildResponse::from_child(&song)).unwrap_or_default(),
    )
}

pub fn get_genres(state: &AppState) -> Result<Outcome, SubsonicError> {
    let genres = state.library.genres()?;
    let payload = Genres {
        genre: genres
            .into_iter()
            .map(|g| GenreItem {
                song_count: g.song_count,
                album_count: g.album_count,
                value: g.name,
            })
            .collect(),
    };
    Outcome::payload(
        "genres",
        serde_json::to_value(payload).unwrap_or_else(|_| json!({})),
    )
}

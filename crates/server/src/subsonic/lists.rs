use library::{AlbumListType, SearchOffsets};

use crate::state::AppState;
use crate::utils::iso_datetime;

use super::response::{
    AlbumID3, AlbumList, AlbumList2, ArtistID3, ChildResponse, IndexArtist,
    NowPlayingEntryResponse, NowPlayingResponse, SearchResult2, SearchResult3, Songs,
    Starred2Response, StarredResponse,
};
use super::{Outcome, SubsonicError, SubsonicParams};

fn album_list_args(
    params: &SubsonicParams,
) -> Result<(AlbumListType, u32, u32, Option<&str>, Option<i32>, Option<i32>, Option<i64>), SubsonicError>
{
    let kind = params.require("type")?;
    let kind = AlbumListType::parse(kind).ok_or_else(|| SubsonicError::bad_param("type"))?;
    let size = params.get_u32("size")?.unwrap_or(10).min(500);
    let offset = params.get_u32("offset")?.unwrap_or(0);
    let genre = params.get("genre");
    let from_year = params.get_i32("fromYear")?;
    let to_year = params.get_i32("toYear")?;
    let music_folder = params.get_i64("musicFolderId")?;
    if kind == AlbumListType::ByGenre && genre.is_none() {
        return Err(SubsonicError::missing_param("genre"));
    }
    if kind == AlbumListType::ByYear && from_year.is_none() && to_year.is_none() {
        return Err(SubsonicError::missing_param("fromYear"));
    }
    Ok((kind, size, offset, genre, from_year, to_year, music_folder))
}

pub fn get_album_list(state: &AppState, params: &SubsonicParams) -> Result<Outcome, SubsonicError> {
    let (kind, size, offset, genre, from_year, to_year, music_folder) = album_list_args(params)?;
    let albums = state
        .library
        .album_list(kind, size, offset, genre, from_year, to_year, music_folder)?;
    let mut entries = Vec::with_capacity(albums.len());
    for album in &albums {
        let stats = state.library.album_stats(&album.id)?;
        entries.push(ChildResponse::from_album(album, &stats));
    }
    Outcome::payload(
        "albumList",
        serde_json::to_value(AlbumList { album: entries }).unwrap_or_default(),
    )
}

pub fn get_album_list2(
    state: &AppState,
    params: &SubsonicParams,
) -> Result<Outcome, SubsonicError> {
    let (kind, size, offset, genre, from_year, to_year, music_folder) = album_list_args(params)?;
    let albums = state
        .library
        .album_list(kind, size, offset, genre, from_year, to_year, music_folder)?;
    let mut entries = Vec::with_capacity(albums.len());
    for album in &albums {
        let stats = state.library.album_stats(&album.id)?;
        entries.push(AlbumID3::from_album(album, &stats));
    }
    Outcome::payload(
        "albumList2",
        serde_json::to_value(AlbumList2 { album: entries }).unwrap_or_default(),
    )
}

pub fn get_random_songs(
    state: &AppState,
    params: &SubsonicParams,
) -> Result<Outcome, SubsonicError> {
    let size = params.get_u32("size")?.unwrap_or(10).min(500);
    let songs = state.library.random_songs(
        size,
        params.get("genre"),
        params.get_i32("fromYear")?,
        params.get_i32("toYear")?,
        params.get_i64("musicFolderId")?,
    )?;
    let payload = Songs {
        song: songs.iter().map(ChildResponse::from_child).collect(),
    };
    Outcome::payload(
        "randomSongs",
        serde_json::to_value(payload).unwrap_or_default(),
    )
}

pub fn get_songs_by_genre(
    state: &AppState,
    params: &SubsonicParams,
) -> Result<Outcome, SubsonicError> {
    let genre = params.require("genre")?;
    let count = params.get_u32("count")?.unwrap_or(10).min(500);
    let offset = params.get_u32("offset")?.unwrap_or(0);
    let songs = state
        .library
        .songs_by_genre(genre, count, offset, params.get_i64("musicFolderId")?)?;
    let payload = Songs {
        song: songs.iter().map(ChildResponse::from_child).collect(),
    };
    Outcome::payload(
        "songsByGenre",
        serde_json::to_value(payload).unwrap_or_default(),
    )
}

fn search_offsets(params: &SubsonicParams) -> Result<SearchOffsets, SubsonicError> {
    let defaults = SearchOffsets::default();
    Ok(SearchOffsets {
        artist_count: params.get_u32("artistCount")?.unwrap_or(defaults.artist_count),
        artist_offset: params.get_u32("artistOffset")?.unwrap_or(0),
        album_count: params.get_u32("albumCount")?.unwrap_or(defaults.album_count),
        album_offset: params.get_u32("albumOffset")?.unwrap_or(0),
        song_count: params.get_u32("songCount")?.unwrap_or(defaults.song_count),
        song_offset: params.get_u32("songOffset")?.unwrap_or(0),
    })
}

pub fn search2(state: &AppState, params: &SubsonicParams) -> Result<Outcome, SubsonicError> {
    let query = params.require("query")?;
    let results = state.library.search(query, search_offsets(params)?)?;
    let mut albums = Vec::with_capacity(results.albums.len());
    for album in &results.albums {
        let stats = state.library.album_stats(&album.id)?;
        albums.push(ChildResponse::from_album(album, &stats));
    }
    let payload = SearchResult2 {
        artist: results
            .artists
            .iter()
            .map(|artist| IndexArtist {
                id: artist.id.clone(),
                name: artist.name.clone(),
                starred: artist.starred.map(iso_datetime),
                user_rating: artist.user_rating,
            })
            .collect(),
        album: albums,
        song: results.songs.iter().map(ChildResponse::from_child).collect(),
    };
    Outcome::payload(
        "searchResult2",
        serde_json::to_value(payload).unwrap_or_default(),
    )
}

pub fn search3(state: &AppState, params: &SubsonicParams) -> Result<Outcome, SubsonicError> {
    let query = params.require("query")?;
    let results = state.library.search(query, search_offsets(params)?)?;
    let mut albums = Vec::with_capacity(results.albums.len());
    for album in &results.albums {
        let stats = state.library.album_stats(&album.id)?;
        albums.push(AlbumID3::from_album(album, &stats));
    }
    let mut artists = Vec::with_capacity(results.artists.len());
    for artist in &results.artists {
        artists.push(ArtistID3::from_artist(artist, 0));
    }
    let payload = SearchResult3 {
        artist: artists,
        album: albums,
        song: results.songs.iter().map(ChildResponse::from_child).collect(),
    };
    Outcome::payload(
        "searchResult3",
        serde_json::to_value(payload).unwrap_or_default(),
    )
}

pub fn get_starred(state: &AppState) -> Result<Outcome, SubsonicError> {
    let starred = state.library.starred()?;
    let mut albums = Vec::with_capacity(starred.albums.len());
    for album in &starred.albums {
        let stats = state.library.album_stats(&album.id)?;
        albums.push(ChildResponse::from_album(album, &stats));
    }
    let payload = StarredResponse {
        artist: starred
            .artists
            .iter()
            .map(|artist| IndexArtist {
                id: artist.id.clone(),
                name: artist.name.clone(),
                starred: artist.starred.map(iso_datetime),
                user_rating: artist.user_rating,
            })
            .collect(),
        album: albums,
        song: starred.songs.iter().map(ChildResponse::from_child).collect(),
    };
    Outcome::payload("starred", serde_json::to_value(payload).unwrap_or_default())
}

pub fn get_starred2(state: &AppState) -> Result<Outcome, SubsonicError> {
    let starred = state.library.starred()?;
    let mut albums = Vec::with_capacity(starred.albums.len());
    for album in &starred.albums {
        let stats = state.library.album_stats(&album.id)?;
        albums.push(AlbumID3::from_album(album, &stats));
    }
    let payload = Starred2Response {
        artist: starred
            .artists
            .iter()
            .map(|artist| ArtistID3::from_artist(artist, 0))
            .collect(),
        album: albums,
        song: starred.songs.iter().map(ChildResponse::from_child).collect(),
    };
    Outcome::payload(
        "starred2",
        serde_json::to_value(payload).unwrap_or_default(),
    )
}

pub fn get_now_playing(state: &AppState) -> Result<Outcome, SubsonicError> {
    let mut entries = Vec::new();
    for entry in state.now_playing.snapshot() {
        if let Some(child) = state.library.child(&entry.child_id)? {
            entries.push(NowPlayingEntryResponse::from_entry(
                &entry,
                ChildResponse::from_child(&child),
            ));
        }
    }
    Outcome::payload(
        "nowPlaying",
        serde_json::to_value(NowPlayingResponse { entry: entries }).unwrap_or_default(),
    )
}

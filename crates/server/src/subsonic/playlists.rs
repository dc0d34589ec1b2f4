use common::User;

use crate::state::AppState;

use super::response::{ChildResponse, PlaylistResponse, PlaylistWithSongs, Playlists};
use super::{Outcome, SubsonicError, SubsonicParams};

fn parse_playlist_id(value: &str) -> Result<i64, SubsonicError> {
    value
        .parse()
        .map_err(|_| SubsonicError::bad_param("playlistId"))
}

/// Non-owners may read public playlists but never modify them.
fn require_owner(state: &AppState, id: i64, user: &User) -> Result<(), SubsonicError> {
    let playlist = state
        .library
        .playlist(id)?
        .ok_or_else(SubsonicError::not_found)?;
    if playlist.owner != user.username && !user.is_admin {
        return Err(SubsonicError::permission_denied());
    }
    Ok(())
}

pub fn get_playlists(
    state: &AppState,
    params: &SubsonicParams,
    user: &User,
) -> Result<Outcome, SubsonicError> {
    let owner = params.get("username");
    let playlists = state.library.playlists_for(&user.username, owner)?;
    let payload = Playlists {
        playlist: playlists
            .iter()
            .map(|(playlist, songs, duration)| {
                PlaylistResponse::from_playlist(playlist, *songs, *duration)
            })
            .collect(),
    };
    Outcome::payload(
        "playlists",
        serde_json::to_value(payload).unwrap_or_default(),
    )
}

pub fn get_playlist(
    state: &AppState,
    params: &SubsonicParams,
    user: &User,
) -> Result<Outcome, SubsonicError> {
    let id = parse_playlist_id(params.require("id")?)?;
    let playlist = state
        .library
        .playlist(id)?
        .ok_or_else(SubsonicError::not_found)?;
    if !playlist.public && playlist.owner != user.username && !user.is_admin {
        return Err(SubsonicError::permission_denied());
    }
    let songs = state.library.playlist_songs(id)?;
    let duration: i64 = songs.iter().map(|s| i64::from(s.duration.unwrap_or(0))).sum();
    let payload = PlaylistWithSongs {
        playlist: PlaylistResponse::from_playlist(&playlist, songs.len() as i64, duration),
        entry: songs.iter().map(ChildResponse::from_child).collect(),
    };
    Outcome::payload("playlist", serde_json::to_value(payload).unwrap_or_default())
}

/// Creates a playlist, or replaces the song list when `playlistId` names
/// an existing one.
pub fn create_playlist(
    state: &AppState,
    params: &SubsonicParams,
    user: &User,
) -> Result<Outcome, SubsonicError> {
    let song_ids: Vec<String> = params
        .get_all("songId")
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    if let Some(existing) = params.get("playlistId") {
        let id = parse_playlist_id(existing)?;
        require_owner(state, id, user)?;
        state.library.replace_playlist_songs(id, &song_ids)?;
        return playlist_payload(state, id);
    }

    let name = params.require("name")?;
    let playlist = state.library.create_playlist(&user.username, name, &song_ids)?;
    playlist_payload(state, playlist.id)
}

fn playlist_payload(state: &AppState, id: i64) -> Result<Outcome, SubsonicError> {
    let playlist = state
        .library
        .playlist(id)?
        .ok_or_else(SubsonicError::not_found)?;
    let songs = state.library.playlist_songs(id)?;
    let duration: i64 = songs.iter().map(|s| i64::from(s.duration.unwrap_or(0))).sum();
    let payload = PlaylistWithSongs {
        playlist: PlaylistResponse::from_playlist(&playlist, songs.len() as i64, duration),
        entry: songs.iter().map(ChildResponse::from_child).collect(),
    };
    Outcome::payload("playlist", serde_json::to_value(payload).unwrap_or_default())
}

pub fn update_playlist(
    state: &AppState,
    params: &SubsonicParams,
    user: &User,
) -> Result<Outcome, SubsonicError> {
    let id = parse_playlist_id(params.require("playlistId")?)?;
    require_owner(state, id, user)?;

    let add: Vec<String> = params
        .get_all("songIdToAdd")
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let mut remove: Vec<u32> = Vec::new();
    for value in params.get_all("songIndexToRemove") {
        remove.push(
            value
                .parse()
                .map_err(|_| SubsonicError::bad_param("songIndexToRemove"))?,
        );
    }

    state.library.update_playlist(
        id,
        params.get("name"),
        params.get("comment"),
        params.get_bool("public"),
        &add,
        &remove,
    )?;
    Outcome::empty()
}

pub fn delete_playlist(
    state: &AppState,
    params: &SubsonicParams,
    user: &User,
) -> Result<Outcome, SubsonicError> {
    let id = parse_playlist_id(params.require("id")?)?;
    require_owner(state, id, user)?;
    if !state.library.delete_playlist(id)? {
        return Err(SubsonicError::not_found());
    }
    Outcome::empty()
}

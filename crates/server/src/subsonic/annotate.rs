use common::{PlayQueue, User};

use crate::state::AppState;

use super::response::{BookmarkResponse, Bookmarks, ChildResponse, PlayQueueResponse};
use super::{Outcome, SubsonicError, SubsonicParams};

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// star/unstar accept any mix of `id`, `albumId`, and `artistId`; every
/// named target must exist.
fn set_starred_all(
    state: &AppState,
    params: &SubsonicParams,
    starred: bool,
) -> Result<Outcome, SubsonicError> {
    let mut ids: Vec<&str> = params.get_all("id");
    ids.extend(params.get_all("albumId"));
    ids.extend(params.get_all("artistId"));
    if ids.is_empty() {
        return Err(SubsonicError::missing_param("id"));
    }
    for id in ids {
        if !state.library.set_starred(id, starred)? {
            return Err(SubsonicError::not_found());
        }
    }
    Outcome::empty()
}

pub fn star(state: &AppState, params: &SubsonicParams) -> Result<Outcome, SubsonicError> {
    set_starred_all(state, params, true)
}

pub fn unstar(state: &AppState, params: &SubsonicParams) -> Result<Outcome, SubsonicError> {
    set_starred_all(state, params, false)
}

pub fn set_rating(state: &AppState, params: &SubsonicParams) -> Result<Outcome, SubsonicError> {
    let id = params.require("id")?;
    let rating: i32 = params
        .require("rating")?
        .parse()
        .map_err(|_| SubsonicError::bad_param("rating"))?;
    if !(0..=5).contains(&rating) {
        return Err(SubsonicError::bad_param("rating"));
    }
    if !state.library.set_rating(id, rating)? {
        return Err(SubsonicError::not_found());
    }
    Outcome::empty()
}

/// `submission=false` only refreshes the now-playing table; a real
/// submission also bumps play counts.
pub fn scrobble(
    state: &AppState,
    params: &SubsonicParams,
    user: &User,
) -> Result<Outcome, SubsonicError> {
    let id = params.require("id")?;
    let submission = params.get_bool("submission").unwrap_or(true);
    let time_secs = params.get_i64("time")?.map(|ms| ms / 1000);

    let child = state
        .library
        .child(id)?
        .filter(|c| !c.is_dir)
        .ok_or_else(SubsonicError::not_found)?;

    let client = params.get("c").unwrap_or("unknown");
    state
        .now_playing
        .record(&user.username, &child.id, client, client);

    if submission && user.roles.scrobbling {
        state.library.scrobble(&child.id, time_secs)?;
    }
    Outcome::empty()
}

pub fn get_bookmarks(state: &AppState, user: &User) -> Result<Outcome, SubsonicError> {
    let bookmarks = state.library.bookmarks(&user.username)?;
    let payload = Bookmarks {
        bookmark: bookmarks
            .iter()
            .filter_map(|(bookmark, child)| {
                child.as_ref().map(|child| {
                    BookmarkResponse::from_bookmark(bookmark, ChildResponse::from_child(child))
                })
            })
            .collect(),
    };
    Outcome::payload(
        "bookmarks",
        serde_json::to_value(payload).unwrap_or_default(),
    )
}

pub fn create_bookmark(
    state: &AppState,
    params: &SubsonicParams,
    user: &User,
) -> Result<Outcome, SubsonicError> {
    let id = params.require("id")?;
    let position = params
        .get_i64("position")?
        .ok_or_else(|| SubsonicError::missing_param("position"))?;
    state
        .library
        .child(id)?
        .filter(|c| !c.is_dir)
        .ok_or_else(SubsonicError::not_found)?;
    state
        .library
        .upsert_bookmark(&user.username, id, position, params.get("comment"))?;
    Outcome::empty()
}

pub fn delete_bookmark(
    state: &AppState,
    params: &SubsonicParams,
    user: &User,
) -> Result<Outcome, SubsonicError> {
    let id = params.require("id")?;
    state.library.delete_bookmark(&user.username, id)?;
    Outcome::empty()
}

pub fn get_play_queue(state: &AppState, user: &User) -> Result<Outcome, SubsonicError> {
    let queue = match state.library.play_queue(&user.username)? {
        Some(queue) => queue,
        None => return Outcome::empty(),
    };
    let mut entries = Vec::with_capacity(queue.song_ids.len());
    for id in &queue.song_ids {
        if let Some(child) = state.library.child(id)? {
            entries.push(ChildResponse::from_child(&child));
        }
    }
    Outcome::payload(
        "playQueue",
        serde_json::to_value(PlayQueueResponse::from_queue(&queue, entries)).unwrap_or_default(),
    )
}

pub fn save_play_queue(
    state: &AppState,
    params: &SubsonicParams,
    user: &User,
) -> Result<Outcome, SubsonicError> {
    let song_ids: Vec<String> = params
        .get_all("id")
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let queue = PlayQueue {
        username: user.username.clone(),
        current: params.get("current").map(|s| s.to_string()),
        position: params.get_i64("position")?.unwrap_or(0),
        changed_by: params.get("c").unwrap_or("unknown").to_string(),
        changed_at: now_secs(),
        song_ids,
    };
    state.library.save_play_queue(&queue)?;
    Outcome::empty()
}

pub mod annotate;
pub mod browsing;
pub mod lists;
pub mod media;
pub mod playlists;
pub mod response;
pub mod system;
pub mod xml;

use axum::body::Body;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use common::{md5_hex, User};
use serde_json::{json, Value};
use tracing::debug;

use crate::state::AppState;
use response::API_VERSION;

/// Query plus form parameters, duplicates preserved (`id` repeats in
/// savePlayQueue and updatePlaylist).
pub struct SubsonicParams {
    pairs: Vec<(String, String)>,
}

impl SubsonicParams {
    pub(crate) fn parse(query: Option<&str>, body: &str) -> Self {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for source in [query.unwrap_or(""), body] {
            if source.is_empty() {
                continue;
            }
            pairs.extend(
                serde_urlencoded::from_str::<Vec<(String, String)>>(source).unwrap_or_default(),
            );
        }
        Self { pairs }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn require(&self, name: &str) -> Result<&str, SubsonicError> {
        self.get(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SubsonicError::missing_param(name))
    }

    pub fn get_u32(&self, name: &str) -> Result<Option<u32>, SubsonicError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| SubsonicError::bad_param(name)),
        }
    }

    pub fn get_i32(&self, name: &str) -> Result<Option<i32>, SubsonicError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| SubsonicError::bad_param(name)),
        }
    }

    pub fn get_i64(&self, name: &str) -> Result<Option<i64>, SubsonicError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| SubsonicError::bad_param(name)),
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| v == "true" || v == "1")
    }
}

#[derive(Debug)]
pub struct SubsonicError {
    pub code: u32,
    pub message: String,
}

impl SubsonicError {
    pub fn generic(message: impl Into<String>) -> Self {
        Self {
            code: 0,
            message: message.into(),
        }
    }

    pub fn missing_param(name: &str) -> Self {
        Self {
            code: 10,
            message: format!("required parameter '{}' is missing", name),
        }
    }

    pub fn bad_param(name: &str) -> Self {
        Self {
            code: 10,
            message: format!("invalid value for parameter '{}'", name),
        }
    }

    pub fn user_not_found() -> Self {
        Self {
            code: 10,
            message: "user not found".to_string(),
        }
    }

    pub fn wrong_credentials() -> Self {
        Self {
            code: 40,
            message: "wrong credentials".to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            code: 70,
            message: "requested data not found".to_string(),
        }
    }

    pub fn permission_denied() -> Self {
        Self {
            code: 0,
            message: "Permission denied".to_string(),
        }
    }
}

impl From<library::LibraryError> for SubsonicError {
    fn from(err: library::LibraryError) -> Self {
        SubsonicError::generic(err.to_string())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Xml,
    Json,
}

/// A handler either produces an envelope payload or a raw byte response
/// (stream, download, getCoverArt).
pub enum Outcome {
    Payload(Option<(&'static str, Value)>),
    Raw(Response),
}

impl Outcome {
    pub fn empty() -> Result<Outcome, SubsonicError> {
        Ok(Outcome::Payload(None))
    }

    pub fn payload(key: &'static str, value: Value) -> Result<Outcome, SubsonicError> {
        Ok(Outcome::Payload(Some((key, value))))
    }
}

pub fn subsonic_router(state: AppState) -> Router {
    Router::new()
        .route("/:endpoint", get(handle).post(handle))
        .with_state(state)
}

async fn handle(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: String,
) -> Response {
    let params = SubsonicParams::parse(query.as_deref(), &body);
    let format = if params.get("f").map(|f| f.starts_with("json")).unwrap_or(false) {
        Format::Json
    } else {
        Format::Xml
    };

    // Clients send both `ping` and `ping.view`.
    let endpoint = endpoint.trim_end_matches(".view").to_string();

    let user = match authenticate(&state, &params) {
        Ok(user) => user,
        Err(err) => return error_response(format, &err),
    };

    let result = dispatch(&endpoint, &state, &params, &headers, &user).await;
    match result {
        Ok(Outcome::Payload(payload)) => ok_response(format, payload),
        Ok(Outcome::Raw(response)) => response,
        Err(err) => {
            debug!("subsonic {} failed: {} ({})", endpoint, err.message, err.code);
            error_response(format, &err)
        }
    }
}

async fn dispatch(
    endpoint: &str,
    state: &AppState,
    params: &SubsonicParams,
    headers: &HeaderMap,
    user: &User,
) -> Result<Outcome, SubsonicError> {
    match endpoint {
        "ping" => Outcome::empty(),
        "getLicense" => system::get_license(),
        "getUser" => system::get_user(state, params, user),
        "startScan" => system::start_scan(state),
        "getScanStatus" => system::get_scan_status(state),
        "getMusicFolders" => browsing::get_music_folders(state),
        "getIndexes" => browsing::get_indexes(state, params),
        "getMusicDirectory" => browsing::get_music_directory(state, params),
        "getArtists" => browsing::get_artists(state),
        "getArtist" => browsing::get_artist(state, params),
        "getAlbum" => browsing::get_album(state, params),
        "getSong" => browsing::get_song(state, params),
        "getGenres" => browsing::get_genres(state),
        "getAlbumList" => lists::get_album_list(state, params),
        "getAlbumList2" => lists::get_album_list2(state, params),
        "getRandomSongs" => lists::get_random_songs(state, params),
        "getSongsByGenre" => lists::get_songs_by_genre(state, params),
        "getStarred" => lists::get_starred(state),
        "getStarred2" => lists::get_starred2(state),
        "search2" => lists::search2(state, params),
        "search3" => lists::search3(state, params),
        "getNowPlaying" => lists::get_now_playing(state),
        "getPlaylists" => playlists::get_playlists(state, params, user),
        "getPlaylist" => playlists::get_playlist(state, params, user),
        "createPlaylist" => playlists::create_playlist(state, params, user),
        "updatePlaylist" => playlists::update_playlist(state, params, user),
        "deletePlaylist" => playlists::delete_playlist(state, params, user),
        "star" => annotate::star(state, params),
        "unstar" => annotate::unstar(state, params),
        "setRating" => annotate::set_rating(state, params),
        "scrobble" => annotate::scrobble(state, params, user),
        "getBookmarks" => annotate::get_bookmarks(state, user),
        "createBookmark" => annotate::create_bookmark(state, params, user),
        "deleteBookmark" => annotate::delete_bookmark(state, params, user),
        "getPlayQueue" => annotate::get_play_queue(state, user),
        "savePlayQueue" => annotate::save_play_queue(state, params, user),
        "getLyrics" => media::get_lyrics(state, params),
        "stream" => media::stream(state, params, headers, false).await,
        "download" => media::stream(state, params, headers, true).await,
        "getCoverArt" => media::get_cover_art(state, params).await,
        _ => Err(SubsonicError {
            code: 0,
            message: format!("unknown endpoint: {}", endpoint),
        }),
    }
}

/// Either `u`+`p` (plain or `enc:`-hex) or `u`+`t`+`s` with
/// `t = md5(storedPassword + s)`.
fn authenticate(state: &AppState, params: &SubsonicParams) -> Result<User, SubsonicError> {
    let username = params.require("u")?;
    let user = state
        .library
        .user(username)
        .map_err(|err| SubsonicError::generic(err.to_string()))?
        .ok_or_else(SubsonicError::user_not_found)?;

    let password = state
        .secrets
        .reveal_password(&user.password)
        .map_err(|err| SubsonicError::generic(err.to_string()))?;

    if let (Some(token), Some(salt)) = (params.get("t"), params.get("s")) {
        let expected = md5_hex(&format!("{}{}", password, salt));
        if expected == token.to_lowercase() {
            return Ok(user);
        }
        return Err(SubsonicError::wrong_credentials());
    }

    if let Some(supplied) = params.get("p") {
        let supplied = match supplied.strip_prefix("enc:") {
            Some(encoded) => hex::decode(encoded)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .ok_or_else(SubsonicError::wrong_credentials)?,
            None => supplied.to_string(),
        };
        if supplied == password {
            return Ok(user);
        }
        return Err(SubsonicError::wrong_credentials());
    }

    Err(SubsonicError::missing_param("p"))
}

fn envelope(status: &str, extra: Option<(&str, Value)>) -> Value {
    let mut body = json!({
        "status": status,
        "version": API_VERSION,
    });
    if let Some((key, value)) = extra {
        body[key] = value;
    }
    body
}

pub fn ok_response(format: Format, payload: Option<(&'static str, Value)>) -> Response {
    let body = envelope("ok", payload);
    render(format, body)
}

pub fn error_response(format: Format, err: &SubsonicError) -> Response {
    let body = envelope(
        "failed",
        Some((
            "error",
            json!({"code": err.code, "message": err.message}),
        )),
    );
    render(format, body)
}

fn render(format: Format, mut body: Value) -> Response {
    match format {
        Format::Json => {
            let wrapped = json!({ "subsonic-response": body });
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(wrapped.to_string()))
                .unwrap_or_default()
        }
        Format::Xml => {
            if let Some(map) = body.as_object_mut() {
                map.insert(
                    "xmlns".to_string(),
                    Value::String("http://subsonic.org/restapi".to_string()),
                );
            }
            let document = xml::render_document("subsonic-response", &body);
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/xml; charset=utf-8")
                .body(Body::from(document))
                .unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_keep_duplicates() {
        let params = SubsonicParams::parse(Some("id=a&id=b&u=alice"), "");
        assert_eq!(params.get_all("id"), vec!["a", "b"]);
        assert_eq!(params.get("u"), Some("alice"));
    }

    #[test]
    fn body_params_merge_with_query() {
        let params = SubsonicParams::parse(Some("u=alice"), "p=secret");
        assert_eq!(params.get("u"), Some("alice"));
        assert_eq!(params.get("p"), Some("secret"));
    }

    #[test]
    fn envelope_status_matches_error_presence() {
        let ok = envelope("ok", None);
        assert_eq!(ok["status"], "ok");
        assert!(ok.get("error").is_none());

        let failed = envelope(
            "failed",
            Some(("error", serde_json::json!({"code": 70, "message": "x"}))),
        );
        assert_eq!(failed["status"], "failed");
        assert_eq!(failed["error"]["code"], 70);
    }

    #[test]
    fn token_auth_formula() {
        // t = md5(password + salt), lowercase hex.
        let expected = md5_hex("abcxyz");
        assert_eq!(expected, format!("{:x}", md5::compute(b"abcxyz")));
    }

    fn test_state() -> AppState {
        use std::sync::Arc;

        use library::{Library, Scanner};
        use parking_lot::RwLock;

        use crate::config::ServerConfig;
        use crate::nowplaying::NowPlaying;
        use crate::platform::ProviderRegistry;
        use crate::secrets::Secrets;

        let dir = tempfile::tempdir().unwrap();
        let library = Library::open_in_memory(dir.path()).unwrap();
        {
            let conn = library.conn().unwrap();
            conn.execute(
                "INSERT INTO users (username, password, is_admin) VALUES ('alice', 'abc', 0)",
                [],
            )
            .unwrap();
        }
        AppState {
            config_path: dir.path().join("config.yaml"),
            config: Arc::new(RwLock::new(ServerConfig::default())),
            library: library.clone(),
            scanner: Scanner::new(library.clone(), Vec::new()),
            secrets: Secrets::new(library, None, None),
            http: reqwest::Client::new(),
            registry: Arc::new(ProviderRegistry::new("netease")),
            now_playing: NowPlaying::new(),
        }
    }

    #[test]
    fn token_auth_accepts_matching_token() {
        let state = test_state();
        let token = md5_hex("abcxyz");
        let query = format!("u=alice&t={}&s=xyz", token);
        let params = SubsonicParams::parse(Some(&query), "");
        assert!(authenticate(&state, &params).is_ok());
    }

    #[test]
    fn token_auth_rejects_wrong_token() {
        let state = test_state();
        let params = SubsonicParams::parse(Some("u=alice&t=deadbeef&s=xyz"), "");
        assert_eq!(authenticate(&state, &params).unwrap_err().code, 40);
    }

    #[test]
    fn plain_password_auth_works() {
        let state = test_state();
        let params = SubsonicParams::parse(Some("u=alice&p=abc"), "");
        assert!(authenticate(&state, &params).is_ok());
        let params = SubsonicParams::parse(Some("u=alice&p=wrong"), "");
        assert_eq!(authenticate(&state, &params).unwrap_err().code, 40);
    }

    #[test]
    fn unknown_user_reports_code_10() {
        let state = test_state();
        let params = SubsonicParams::parse(Some("u=nobody&p=abc"), "");
        assert_eq!(authenticate(&state, &params).unwrap_err().code, 10);
    }
}

pub mod cookiecloud;
pub mod download;
pub mod library;
pub mod login;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::auth::require_auth;
use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/cookiecloud/server", get(cookiecloud::get_server))
        .route("/cookiecloud/identity", post(cookiecloud::put_identity))
        .route("/download", get(download::download))
        .route("/platform/:platform/user", get(download::platform_user))
        .route("/library/folders", get(library::list_folders))
        .route("/library/directory", get(library::list_directory))
        .route("/library/song", get(library::read_song_tags))
        .route("/library/song", post(library::write_song_tags))
        .route("/library/cover/:id", post(library::upload_cover))
        .route("/library/rescan", post(library::rescan))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/login", post(login::login))
        .merge(protected)
        .with_state(state)
}

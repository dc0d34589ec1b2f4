use std::path::PathBuf;
use std::sync::Arc;

use library::{Library, Scanner};
use parking_lot::RwLock;
use reqwest::Client;

use crate::config::ServerConfig;
use crate::nowplaying::NowPlaying;
use crate::platform::ProviderRegistry;
use crate::secrets::Secrets;

/// Explicit constructor wiring: everything a handler can touch is built
/// once at startup and carried here. Per-request, user-scoped pieces (the
/// cookie jar bound to one identity) are built inside handlers.
#[derive(Clone)]
pub struct AppState {
    pub config_path: PathBuf,
    pub config: Arc<RwLock<ServerConfig>>,
    pub library: Library,
    pub scanner: Scanner,
    pub secrets: Secrets,
    pub http: Client,
    pub registry: Arc<ProviderRegistry>,
    pub now_playing: NowPlaying,
}

#[derive(Clone)]
pub struct AuthContext {
    pub username: String,
}

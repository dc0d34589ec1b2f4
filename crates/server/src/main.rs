mod api;
mod auth;
mod config;
mod cookiecloud;
mod nowplaying;
mod platform;
mod range;
mod secrets;
mod state;
mod subsonic;
mod utils;

use std::sync::Arc;

use axum::Router;
use library::{Library, Scanner};
use parking_lot::RwLock;
use reqwest::Client;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use api::api_router;
use config::{config_path_from_env, load_or_create_config, resolve_db_path, resolve_path};
use cookiecloud::{spawn_sync_ticker, CookieCloudClient};
use nowplaying::NowPlaying;
use platform::ProviderRegistry;
use secrets::Secrets;
use state::AppState;
use subsonic::subsonic_router;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.clone().into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let data_dir = resolve_path(&config_path, &config.data_dir);
    let db_path = resolve_db_path(&config_path, &config);
    let library = Library::open(&db_path, &data_dir)?;
    library.ensure_default_admin()?;

    let folders: Vec<(String, String)> = config
        .music_folders
        .iter()
        .filter(|f| !f.path.trim().is_empty())
        .map(|f| {
            (
                f.name.clone(),
                resolve_path(&config_path, &f.path).to_string_lossy().to_string(),
            )
        })
        .collect();
    if folders.is_empty() {
        info!("No music folders configured; set music_folders in {:?}", config_path);
    }
    let scanner = Scanner::new(library.clone(), folders.clone());

    let secrets = Secrets::new(
        library.clone(),
        Some(config.jwt_secret.clone()),
        Some(config.password_secret.clone()),
    );
    let http = Client::builder().user_agent("mezzo/0.1").build()?;
    let registry = Arc::new(ProviderRegistry::new(&config.platform.default));

    let state = AppState {
        config_path: config_path.clone(),
        config: Arc::new(RwLock::new(config.clone())),
        library: library.clone(),
        scanner: scanner.clone(),
        secrets,
        http: http.clone(),
        registry,
        now_playing: NowPlaying::new(),
    };

    if config.scan.on_start && !folders.is_empty() {
        let scanner = scanner.clone();
        let incremental = config.incremental_scan();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = scanner.scan_all(incremental) {
                warn!("startup scan failed: {}", err);
            }
        });
    }

    if !config.cookiecloud.url.is_empty() && config.cookiecloud.sync_interval_secs > 0 {
        // The background pusher rides on the admin identity when one is
        // configured; per-user jars are built per request.
        match library.identity("admin") {
            Ok(Some(identity)) => {
                let client = CookieCloudClient::new(
                    http.clone(),
                    &config.cookiecloud.url,
                    &identity.uuid,
                    &identity.password,
                );
                spawn_sync_ticker(client, config.cookiecloud.sync_interval_secs);
            }
            Ok(None) => info!("cookiecloud sync enabled but no admin identity stored yet"),
            Err(err) => warn!("cookiecloud identity lookup failed: {}", err),
        }
    }

    let app = Router::new()
        .nest("/api", api_router(state.clone()))
        .nest("/rest", subsonic_router(state.clone()))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scanner))
        .await?;
    Ok(())
}

async fn shutdown_signal(scanner: Scanner) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
    scanner.cancel();
}

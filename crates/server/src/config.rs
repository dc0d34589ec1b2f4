use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicFolderConfig {
    pub name: String,
    pub path: String,
}

impl Default for MusicFolderConfig {
    fn default() -> Self {
        Self {
            name: "Music".to_string(),
            path: String::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// `incremental` (default) or `full`.
    pub mode: String,
    pub on_start: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: "incremental".to_string(),
            on_start: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieCloudConfig {
    pub url: String,
    /// Push interval in seconds; zero or negative disables the ticker.
    pub sync_interval_secs: i64,
}

impl Default for CookieCloudConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            sync_interval_secs: 0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub default: String,
    /// Default destination for downloaded tracks; empty means no local
    /// write unless the request names one.
    pub download_dir: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            default: "netease".to_string(),
            download_dir: String::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub version: u32,
    pub environment: String,
    pub port: u16,
    pub log_level: String,
    pub data_dir: String,
    pub db_path: String,
    pub music_folders: Vec<MusicFolderConfig>,
    pub ignored_articles: String,
    pub scan: ScanConfig,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub jwt_secret: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password_secret: String,
    pub cookiecloud: CookieCloudConfig,
    pub platform: PlatformConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            environment: "production".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            data_dir: "data".to_string(),
            db_path: String::new(),
            music_folders: Vec::new(),
            ignored_articles: "The El La Los Las Le Les".to_string(),
            scan: ScanConfig::default(),
            jwt_secret: String::new(),
            password_secret: String::new(),
            cookiecloud: CookieCloudConfig::default(),
            platform: PlatformConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn ignored_article_list(&self) -> Vec<String> {
        self.ignored_articles
            .split_whitespace()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn incremental_scan(&self) -> bool {
        !self.scan.mode.eq_ignore_ascii_case("full")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("MEZZO_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    if let Some(home) = env::var_os("HOME") {
        let dir = PathBuf::from(home).join(".config").join("mezzo");
        return dir.join("config.yaml");
    }
    PathBuf::from("config.yaml")
}

pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.port == 0 {
            config.port = 3000;
        }
        apply_env_overrides(&mut config);
        return Ok((config, false));
    }

    let mut config = ServerConfig::default();
    save_config(path, &config)?;
    apply_env_overrides(&mut config);
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

/// Environment wins over the file for deployment-shaped settings.
fn apply_env_overrides(config: &mut ServerConfig) {
    if let Ok(port) = env::var("MEZZO_PORT") {
        if let Ok(port) = port.trim().parse() {
            config.port = port;
        }
    }
    if let Ok(environment) = env::var("MEZZO_ENV") {
        if !environment.trim().is_empty() {
            config.environment = environment.trim().to_string();
        }
    }
    if let Ok(level) = env::var("MEZZO_LOG") {
        if !level.trim().is_empty() {
            config.log_level = level.trim().to_string();
        }
    }
    if let Ok(secret) = env::var("MEZZO_JWT_SECRET") {
        if !secret.trim().is_empty() {
            config.jwt_secret = secret.trim().to_string();
        }
    }
    if let Ok(secret) = env::var("MEZZO_PASSWORD_SECRET") {
        if !secret.trim().is_empty() {
            config.password_secret = secret.trim().to_string();
        }
    }
    if let Ok(folders) = env::var("MEZZO_MUSIC_FOLDERS") {
        let parsed: Vec<MusicFolderConfig> = folders
            .split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| MusicFolderConfig {
                name: folder_name_for(p),
                path: p.to_string(),
            })
            .collect();
        if !parsed.is_empty() {
            config.music_folders = parsed;
        }
    }
    if let Ok(mode) = env::var("MEZZO_SCAN_MODE") {
        if !mode.trim().is_empty() {
            config.scan.mode = mode.trim().to_string();
        }
    }
}

fn folder_name_for(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "Music".to_string())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

/// Database location: explicit `db_path`, or `mezzo.db` inside the data
/// directory.
pub fn resolve_db_path(config_path: &Path, config: &ServerConfig) -> PathBuf {
    if !config.db_path.trim().is_empty() {
        return resolve_path(config_path, config.db_path.trim());
    }
    resolve_path(config_path, &config.data_dir).join("mezzo.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(created);
        assert_eq!(config.port, 3000);
        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(config.scan.mode, "incremental");
    }

    #[test]
    fn db_path_defaults_into_data_dir() {
        let config = ServerConfig::default();
        let path = resolve_db_path(Path::new("/etc/mezzo/config.yaml"), &config);
        assert_eq!(path, PathBuf::from("/etc/mezzo/data/mezzo.db"));
    }

    #[test]
    fn ignored_articles_split_on_whitespace() {
        let config = ServerConfig::default();
        let articles = config.ignored_article_list();
        assert!(articles.contains(&"The".to_string()));
        assert!(articles.contains(&"Los".to_string()));
    }
}

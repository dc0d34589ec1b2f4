pub mod downloader;
pub mod netease;

use std::collections::HashMap;

use reqwest::Client;
use serde::Serialize;

use netease::NeteaseProvider;

#[derive(Debug)]
pub enum PlatformError {
    Http(reqwest::Error),
    Api(String),
    BadUri(String),
    UnknownPlatform(String),
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformError::Http(err) => write!(f, "platform http error: {}", err),
            PlatformError::Api(msg) => write!(f, "platform api error: {}", msg),
            PlatformError::BadUri(uri) => write!(f, "unrecognized uri: {}", uri),
            PlatformError::UnknownPlatform(name) => write!(f, "unknown platform: {}", name),
        }
    }
}

impl std::error::Error for PlatformError {}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        PlatformError::Http(err)
    }
}

/// Requested audio quality. The provider may serve a lower level when the
/// account or track cannot deliver the requested one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QualityLevel {
    Standard,
    Higher,
    Exhigh,
    Lossless,
    Hires,
}

impl QualityLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "standard" | "128" => Some(Self::Standard),
            "higher" | "192" => Some(Self::Higher),
            "exhigh" | "320" | "HQ" => Some(Self::Exhigh),
            "lossless" | "SQ" => Some(Self::Lossless),
            "hires" | "HR" => Some(Self::Hires),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Higher => "higher",
            Self::Exhigh => "exhigh",
            Self::Lossless => "lossless",
            Self::Hires => "hires",
        }
    }
}

/// What to do when the destination file already exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    #[default]
    Skip,
    Overwrite,
    Rename,
    UpdateTags,
}

impl ConflictPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "skip" => Some(Self::Skip),
            "overwrite" => Some(Self::Overwrite),
            "rename" => Some(Self::Rename),
            "update_tags" => Some(Self::UpdateTags),
            _ => None,
        }
    }
}

/// A resolved, downloadable track with everything needed to fetch, verify,
/// and tag it.
#[derive(Clone, Debug)]
pub struct TrackSource {
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
    pub album_artists: Vec<String>,
    pub track_no: Option<u32>,
    pub year: Option<i32>,
    pub url: String,
    pub size: u64,
    /// Server-reported checksum the downloaded bytes must match.
    pub md5: String,
    pub file_type: String,
    pub quality: String,
    pub cover_url: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResult {
    pub title: String,
    pub url: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub size: u64,
    pub quality: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformProfile {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub vip: bool,
}

/// Providers are a closed set, dispatched by platform name.
pub enum Provider {
    Netease(NeteaseProvider),
}

impl Provider {
    /// Resolves song/album/playlist URIs into a flat list of track
    /// descriptors at the requested quality.
    pub async fn resolve(
        &self,
        client: &Client,
        uris: &[String],
        level: QualityLevel,
    ) -> Result<Vec<TrackSource>, PlatformError> {
        match self {
            Provider::Netease(provider) => provider.resolve(client, uris, level).await,
        }
    }

    pub async fn profile(&self, client: &Client) -> Result<PlatformProfile, PlatformError> {
        match self {
            Provider::Netease(provider) => provider.profile(client).await,
        }
    }
}

pub struct ProviderRegistry {
    providers: HashMap<String, Provider>,
    default: String,
}

impl ProviderRegistry {
    pub fn new(default: &str) -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "netease".to_string(),
            Provider::Netease(NeteaseProvider::new()),
        );
        Self {
            providers,
            default: default.to_string(),
        }
    }

    pub fn get(&self, name: Option<&str>) -> Result<&Provider, PlatformError> {
        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or(self.default.as_str());
        self.providers
            .get(name)
            .ok_or_else(|| PlatformError::UnknownPlatform(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_aliases_parse() {
        assert_eq!(QualityLevel::parse("lossless"), Some(QualityLevel::Lossless));
        assert_eq!(QualityLevel::parse("SQ"), Some(QualityLevel::Lossless));
        assert_eq!(QualityLevel::parse("320"), Some(QualityLevel::Exhigh));
        assert_eq!(QualityLevel::parse("HR"), Some(QualityLevel::Hires));
        assert_eq!(QualityLevel::parse("bogus"), None);
    }

    #[test]
    fn conflict_policy_parses() {
        assert_eq!(ConflictPolicy::parse("skip"), Some(ConflictPolicy::Skip));
        assert_eq!(
            ConflictPolicy::parse("update_tags"),
            Some(ConflictPolicy::UpdateTags)
        );
        assert_eq!(ConflictPolicy::parse("other"), None);
    }

    #[test]
    fn registry_falls_back_to_default() {
        let registry = ProviderRegistry::new("netease");
        assert!(registry.get(None).is_ok());
        assert!(registry.get(Some("netease")).is_ok());
        assert!(matches!(
            registry.get(Some("spotify")),
            Err(PlatformError::UnknownPlatform(_))
        ));
    }
}

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::{PlatformError, PlatformProfile, QualityLevel, TrackSource};

const API_BASE: &str = "https://music.163.com/api";

/// One URI names a song, an album, or a playlist, either as a bare id or
/// a share URL.
#[derive(Debug, PartialEq, Eq)]
enum UriKind {
    Song(String),
    Album(String),
    Playlist(String),
}

fn parse_uri(uri: &str) -> Result<UriKind, PlatformError> {
    let trimmed = uri.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Ok(UriKind::Song(trimmed.to_string()));
    }
    for (marker, kind) in [
        ("song", UriKind::Song(String::new())),
        ("album", UriKind::Album(String::new())),
        ("playlist", UriKind::Playlist(String::new())),
    ] {
        if trimmed.contains(&format!("{}?", marker)) || trimmed.contains(&format!("/{}/", marker)) {
            if let Some(id) = extract_id(trimmed) {
                return Ok(match kind {
                    UriKind::Song(_) => UriKind::Song(id),
                    UriKind::Album(_) => UriKind::Album(id),
                    UriKind::Playlist(_) => UriKind::Playlist(id),
                });
            }
        }
    }
    Err(PlatformError::BadUri(uri.to_string()))
}

fn extract_id(uri: &str) -> Option<String> {
    if let Some(query) = uri.split('?').nth(1) {
        for pair in query.split('&') {
            if let Some(id) = pair.strip_prefix("id=") {
                let id: String = id.chars().take_while(|c| c.is_ascii_digit()).collect();
                if !id.is_empty() {
                    return Some(id);
                }
            }
        }
    }
    // Path-style ids: /song/123
    uri.rsplit('/')
        .next()
        .map(|tail| tail.chars().take_while(|c| c.is_ascii_digit()).collect())
        .filter(|id: &String| !id.is_empty())
}

#[derive(Deserialize)]
struct SongDetailEnvelope {
    #[serde(default)]
    songs: Vec<SongDetail>,
}

#[derive(Deserialize)]
struct SongDetail {
    id: i64,
    name: String,
    #[serde(default)]
    ar: Vec<NamedRef>,
    #[serde(default)]
    al: AlbumRef,
    #[serde(default)]
    no: Option<u32>,
    #[serde(default, rename = "publishTime")]
    publish_time: Option<i64>,
}

#[derive(Deserialize, Default)]
struct NamedRef {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize, Default)]
struct AlbumRef {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "picUrl")]
    pic_url: Option<String>,
}

#[derive(Deserialize)]
struct SongUrlEnvelope {
    #[serde(default)]
    data: Vec<SongUrl>,
}

#[derive(Deserialize)]
struct SongUrl {
    id: i64,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    md5: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default, rename = "type")]
    file_type: Option<String>,
    #[serde(default)]
    level: Option<String>,
}

#[derive(Deserialize)]
struct AlbumEnvelope {
    #[serde(default)]
    songs: Vec<SongDetail>,
}

#[derive(Deserialize)]
struct PlaylistEnvelope {
    #[serde(default)]
    playlist: PlaylistDetail,
}

#[derive(Deserialize, Default)]
struct PlaylistDetail {
    #[serde(default, rename = "trackIds")]
    track_ids: Vec<TrackIdRef>,
}

#[derive(Deserialize)]
struct TrackIdRef {
    id: i64,
}

#[derive(Deserialize)]
struct AccountEnvelope {
    #[serde(default)]
    profile: Option<AccountProfile>,
}

#[derive(Deserialize)]
struct AccountProfile {
    #[serde(rename = "userId")]
    user_id: i64,
    #[serde(default)]
    nickname: String,
    #[serde(default, rename = "avatarUrl")]
    avatar_url: Option<String>,
    #[serde(default, rename = "vipType")]
    vip_type: i64,
}

/// NetEase Cloud Music provider; authentication rides on the cookies the
/// caller loaded into the HTTP client.
#[derive(Default)]
pub struct NeteaseProvider;

impl NeteaseProvider {
    pub fn new() -> Self {
        Self
    }

    pub async fn resolve(
        &self,
        client: &Client,
        uris: &[String],
        level: QualityLevel,
    ) -> Result<Vec<TrackSource>, PlatformError> {
        let mut song_ids: Vec<String> = Vec::new();
        for uri in uris {
            match parse_uri(uri)? {
                UriKind::Song(id) => song_ids.push(id),
                UriKind::Album(id) => song_ids.extend(self.album_song_ids(client, &id).await?),
                UriKind::Playlist(id) => {
                    song_ids.extend(self.playlist_song_ids(client, &id).await?)
                }
            }
        }
        song_ids.dedup();
        if song_ids.is_empty() {
            return Ok(Vec::new());
        }

        let details = self.song_details(client, &song_ids).await?;
        let urls = self.song_urls(client, &song_ids, level).await?;

        let mut tracks = Vec::new();
        for detail in details {
            let url = urls.iter().find(|u| u.id == detail.id);
            let url = match url {
                Some(url) => url,
                None => {
                    warn!("no stream url for song {}", detail.id);
                    continue;
                }
            };
            let stream_url = match &url.url {
                Some(value) if !value.is_empty() => value.clone(),
                _ => {
                    warn!("song {} has no playable url (vip or region lock?)", detail.id);
                    continue;
                }
            };
            let artists: Vec<String> = detail
                .ar
                .iter()
                .map(|a| a.name.clone())
                .filter(|n| !n.is_empty())
                .collect();
            tracks.push(TrackSource {
                id: detail.id.to_string(),
                title: detail.name.clone(),
                album: detail.al.name.clone(),
                album_artists: artists.clone(),
                artists,
                track_no: detail.no,
                year: detail
                    .publish_time
                    .map(|ms| {
                        time::OffsetDateTime::from_unix_timestamp(ms / 1000)
                            .map(|t| t.year())
                            .unwrap_or(0)
                    })
                    .filter(|y| *y > 0),
                url: stream_url,
                size: url.size.unwrap_or(0),
                md5: url.md5.clone().unwrap_or_default().to_lowercase(),
                file_type: url
                    .file_type
                    .clone()
                    .unwrap_or_else(|| "mp3".to_string())
                    .to_lowercase(),
                quality: url
                    .level
                    .clone()
                    .unwrap_or_else(|| level.as_str().to_string()),
                cover_url: detail.al.pic_url.clone(),
            });
        }
        Ok(tracks)
    }

    pub async fn profile(&self, client: &Client) -> Result<PlatformProfile, PlatformError> {
        let envelope: AccountEnvelope = client
            .get(format!("{}/nuser/account/get", API_BASE))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let profile = envelope
            .profile
            .ok_or_else(|| PlatformError::Api("not logged in".to_string()))?;
        Ok(PlatformProfile {
            id: profile.user_id.to_string(),
            name: profile.nickname,
            avatar_url: profile.avatar_url,
            vip: profile.vip_type > 0,
        })
    }

    async fn song_details(
        &self,
        client: &Client,
        ids: &[String],
    ) -> Result<Vec<SongDetail>, PlatformError> {
        let c: Vec<_> = ids.iter().map(|id| json!({ "id": id })).collect();
        let envelope: SongDetailEnvelope = client
            .get(format!("{}/v3/song/detail", API_BASE))
            .query(&[("c", serde_json::to_string(&c).unwrap_or_default())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(envelope.songs)
    }

    async fn song_urls(
        &self,
        client: &Client,
        ids: &[String],
        level: QualityLevel,
    ) -> Result<Vec<SongUrl>, PlatformError> {
        let ids_param = format!(
            "[{}]",
            ids.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(",")
        );
        let envelope: SongUrlEnvelope = client
            .get(format!("{}/song/enhance/player/url/v1", API_BASE))
            .query(&[
                ("ids", ids_param.as_str()),
                ("level", level.as_str()),
                ("encodeType", "flac"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(envelope.data)
    }

    async fn album_song_ids(
        &self,
        client: &Client,
        id: &str,
    ) -> Result<Vec<String>, PlatformError> {
        let envelope: AlbumEnvelope = client
            .get(format!("{}/v1/album/{}", API_BASE, id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(envelope.songs.iter().map(|s| s.id.to_string()).collect())
    }

    async fn playlist_song_ids(
        &self,
        client: &Client,
        id: &str,
    ) -> Result<Vec<String>, PlatformError> {
        let envelope: PlaylistEnvelope = client
            .get(format!("{}/v6/playlist/detail", API_BASE))
            .query(&[("id", id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(envelope
            .playlist
            .track_ids
            .iter()
            .map(|t| t.id.to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ids_are_songs() {
        assert_eq!(parse_uri("12345").unwrap(), UriKind::Song("12345".to_string()));
    }

    #[test]
    fn share_urls_parse_by_kind() {
        assert_eq!(
            parse_uri("https://music.163.com/#/song?id=186016&userid=1").unwrap(),
            UriKind::Song("186016".to_string())
        );
        assert_eq!(
            parse_uri("https://music.163.com/#/album?id=18905").unwrap(),
            UriKind::Album("18905".to_string())
        );
        assert_eq!(
            parse_uri("https://music.163.com/playlist?id=24381616").unwrap(),
            UriKind::Playlist("24381616".to_string())
        );
    }

    #[test]
    fn junk_uri_is_rejected() {
        assert!(parse_uri("what is this").is_err());
    }
}

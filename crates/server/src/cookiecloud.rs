use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use reqwest::cookie::Jar;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const OPENSSL_MAGIC: &[u8] = b"Salted__";

#[derive(Debug)]
pub enum CookieCloudError {
    Http(reqwest::Error),
    Crypto(String),
    Payload(String),
}

impl std::fmt::Display for CookieCloudError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CookieCloudError::Http(err) => write!(f, "cookiecloud http error: {}", err),
            CookieCloudError::Crypto(msg) => write!(f, "cookiecloud crypto error: {}", msg),
            CookieCloudError::Payload(msg) => write!(f, "cookiecloud payload error: {}", msg),
        }
    }
}

impl std::error::Error for CookieCloudError {}

impl From<reqwest::Error> for CookieCloudError {
    fn from(err: reqwest::Error) -> Self {
        CookieCloudError::Http(err)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
}

/// Cookies grouped per domain, exactly as the remote store keeps them.
pub type CookieData = HashMap<String, Vec<CookieRecord>>;

#[derive(Deserialize)]
struct PullEnvelope {
    encrypted: String,
}

#[derive(Deserialize)]
struct DecryptedPayload {
    #[serde(default)]
    cookie_data: CookieData,
}

/// Client for one user's CookieCloud identity.
#[derive(Clone)]
pub struct CookieCloudClient {
    http: Client,
    url: String,
    uuid: String,
    password: String,
}

impl CookieCloudClient {
    pub fn new(http: Client, url: &str, uuid: &str, password: &str) -> Self {
        Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            uuid: uuid.to_string(),
            password: password.to_string(),
        }
    }

    /// Fetches and decrypts the cookie payload for this identity.
    pub async fn pull(&self) -> Result<CookieData, CookieCloudError> {
        let url = format!("{}/get/{}", self.url, self.uuid);
        let envelope: PullEnvelope = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let plain = decrypt_payload(&self.uuid, &self.password, &envelope.encrypted)?;
        let payload: DecryptedPayload = serde_json::from_slice(&plain)
            .map_err(|err| CookieCloudError::Payload(err.to_string()))?;
        Ok(payload.cookie_data)
    }

    /// Encrypts and uploads local cookie state back to the store.
    pub async fn push(&self, data: &CookieData) -> Result<(), CookieCloudError> {
        let payload = serde_json::json!({ "cookie_data": data });
        let encrypted = encrypt_payload(&self.uuid, &self.password, payload.to_string().as_bytes())?;
        let body = serde_json::json!({ "uuid": self.uuid, "encrypted": encrypted });
        self.http
            .post(format!("{}/update", self.url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Loads the pulled cookies into a reqwest jar so outbound platform calls
/// carry them.
pub fn build_cookie_jar(data: &CookieData) -> Arc<Jar> {
    let jar = Jar::default();
    for (domain, cookies) in data {
        let host = domain.trim_start_matches('.');
        let url = match format!("https://{}/", host).parse() {
            Ok(url) => url,
            Err(_) => continue,
        };
        for cookie in cookies {
            let path = if cookie.path.is_empty() { "/" } else { &cookie.path };
            let header = format!(
                "{}={}; Domain={}; Path={}",
                cookie.name, cookie.value, host, path
            );
            jar.add_cookie_str(&header, &url);
        }
    }
    Arc::new(jar)
}

/// Background push ticker; disabled when the interval is not positive.
pub fn spawn_sync_ticker(client: CookieCloudClient, interval_secs: i64) {
    if interval_secs <= 0 {
        return;
    }
    let interval = Duration::from_secs(interval_secs as u64);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match client.pull().await {
                Ok(data) => match client.push(&data).await {
                    Ok(()) => info!("cookiecloud sync pushed {} domains", data.len()),
                    Err(err) => warn!("cookiecloud push failed: {}", err),
                },
                Err(err) => warn!("cookiecloud pull failed: {}", err),
            }
        }
    });
}

/// CryptoJS passphrase: first 16 hex chars of md5("{uuid}-{password}").
fn passphrase(uuid: &str, password: &str) -> String {
    let digest = common::md5_hex(&format!("{}-{}", uuid, password));
    digest[..16].to_string()
}

/// OpenSSL EVP_BytesToKey with MD5, one round per block, yielding a
/// 32-byte key and 16-byte IV.
fn evp_bytes_to_key(pass: &[u8], salt: &[u8]) -> ([u8; 32], [u8; 16]) {
    let mut derived = Vec::with_capacity(48);
    let mut previous: Vec<u8> = Vec::new();
    while derived.len() < 48 {
        let mut input = previous.clone();
        input.extend_from_slice(pass);
        input.extend_from_slice(salt);
        let digest = md5::compute(&input);
        previous = digest.to_vec();
        derived.extend_from_slice(&digest.0);
    }
    let mut key = [0u8; 32];
    let mut iv = [0u8; 16];
    key.copy_from_slice(&derived[..32]);
    iv.copy_from_slice(&derived[32..48]);
    (key, iv)
}

fn decrypt_payload(uuid: &str, password: &str, encrypted: &str) -> Result<Vec<u8>, CookieCloudError> {
    let blob = BASE64
        .decode(encrypted.trim())
        .map_err(|err| CookieCloudError::Payload(err.to_string()))?;
    if blob.len() < 16 || &blob[..8] != OPENSSL_MAGIC {
        return Err(CookieCloudError::Crypto("missing salt header".to_string()));
    }
    let (key, iv) = evp_bytes_to_key(passphrase(uuid, password).as_bytes(), &blob[8..16]);
    Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&blob[16..])
        .map_err(|_| CookieCloudError::Crypto("decrypt failed".to_string()))
}

fn encrypt_payload(uuid: &str, password: &str, plain: &[u8]) -> Result<String, CookieCloudError> {
    let mut salt = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut salt);
    let (key, iv) = evp_bytes_to_key(passphrase(uuid, password).as_bytes(), &salt);
    let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plain);
    let mut blob = Vec::with_capacity(16 + ciphertext.len());
    blob.extend_from_slice(OPENSSL_MAGIC);
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(blob))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let plain = br#"{"cookie_data":{"music.example":[{"name":"SESS","value":"x"}]}}"#;
        let encrypted = encrypt_payload("uuid-1", "pw", plain).unwrap();
        let decrypted = decrypt_payload("uuid-1", "pw", &encrypted).unwrap();
        assert_eq!(decrypted, plain.to_vec());
    }

    #[test]
    fn wrong_password_fails() {
        let encrypted = encrypt_payload("uuid-1", "pw", b"{}").unwrap();
        assert!(decrypt_payload("uuid-1", "other", &encrypted).is_err());
    }

    #[test]
    fn passphrase_is_md5_prefix() {
        let phrase = passphrase("u", "p");
        assert_eq!(phrase.len(), 16);
        assert_eq!(phrase, common::md5_hex("u-p")[..16].to_string());
    }

    #[test]
    fn jar_accepts_dotted_domains() {
        let mut data = CookieData::new();
        data.insert(
            ".music.example".to_string(),
            vec![CookieRecord {
                name: "MUSIC_U".to_string(),
                value: "token".to_string(),
                domain: ".music.example".to_string(),
                path: String::new(),
            }],
        );
        // Just ensure construction does not panic and produces a jar.
        let _jar = build_cookie_jar(&data);
    }
}

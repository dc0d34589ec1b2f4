use std::collections::HashMap;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use library::Library;
use parking_lot::RwLock;
use rand::RngCore;
use sha2::{Digest, Sha256};

const JWT_SECRET_KEY: &str = "jwt_secret";
const PASSWORD_SECRET_KEY: &str = "password_secret";
const ENC_PREFIX: &str = "enc:";
const NONCE_LEN: usize = 12;

#[derive(Debug)]
pub enum SecretError {
    Library(library::LibraryError),
    Crypto(String),
}

impl std::fmt::Display for SecretError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretError::Library(err) => write!(f, "secret store error: {}", err),
            SecretError::Crypto(msg) => write!(f, "crypto error: {}", msg),
        }
    }
}

impl std::error::Error for SecretError {}

impl From<library::LibraryError> for SecretError {
    fn from(err: library::LibraryError) -> Self {
        SecretError::Library(err)
    }
}

/// Server secrets, resolved in order: in-memory cache, configuration,
/// persisted system setting, freshly generated.
#[derive(Clone)]
pub struct Secrets {
    library: Library,
    configured_jwt: Option<String>,
    configured_password: Option<String>,
    cache: std::sync::Arc<RwLock<HashMap<&'static str, String>>>,
}

impl Secrets {
    pub fn new(
        library: Library,
        configured_jwt: Option<String>,
        configured_password: Option<String>,
    ) -> Self {
        Self {
            library,
            configured_jwt: configured_jwt.filter(|s| !s.is_empty()),
            configured_password: configured_password.filter(|s| !s.is_empty()),
            cache: std::sync::Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn jwt_secret(&self) -> Result<String, SecretError> {
        self.resolve(JWT_SECRET_KEY, self.configured_jwt.as_deref())
    }

    pub fn password_secret(&self) -> Result<String, SecretError> {
        self.resolve(PASSWORD_SECRET_KEY, self.configured_password.as_deref())
    }

    fn resolve(&self, key: &'static str, configured: Option<&str>) -> Result<String, SecretError> {
        if let Some(cached) = self.cache.read().get(key) {
            return Ok(cached.clone());
        }
        let value = match configured {
            Some(value) => value.to_string(),
            None => match self.library.system_setting(key)? {
                Some(value) => value,
                None => {
                    let mut bytes = [0u8; 32];
                    rand::thread_rng().fill_bytes(&mut bytes);
                    let value = hex::encode(bytes);
                    self.library.put_system_setting(key, &value)?;
                    value
                }
            },
        };
        self.cache.write().insert(key, value.clone());
        Ok(value)
    }

    /// AES-256-GCM with a SHA-256-expanded key; the random nonce is
    /// prepended to the ciphertext and the whole blob hex encoded behind
    /// an `enc:` marker.
    pub fn encrypt_password(&self, plain: &str) -> Result<String, SecretError> {
        let secret = self.password_secret()?;
        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plain.as_bytes())
            .map_err(|_| SecretError::Crypto("encrypt failed".to_string()))?;
        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", ENC_PREFIX, hex::encode(blob)))
    }

    /// Accepts both encrypted and legacy clear-text stored passwords.
    pub fn reveal_password(&self, stored: &str) -> Result<String, SecretError> {
        let encoded = match stored.strip_prefix(ENC_PREFIX) {
            Some(encoded) => encoded,
            None => return Ok(stored.to_string()),
        };
        let blob = hex::decode(encoded)
            .map_err(|_| SecretError::Crypto("malformed password blob".to_string()))?;
        if blob.len() <= NONCE_LEN {
            return Err(SecretError::Crypto("password blob too short".to_string()));
        }
        let secret = self.password_secret()?;
        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let plain = cipher
            .decrypt(Nonce::from_slice(&blob[..NONCE_LEN]), &blob[NONCE_LEN..])
            .map_err(|_| SecretError::Crypto("decrypt failed".to_string()))?;
        String::from_utf8(plain).map_err(|_| SecretError::Crypto("not utf-8".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> Secrets {
        let library = Library::open_in_memory(std::path::Path::new("/tmp")).unwrap();
        Secrets::new(library, None, None)
    }

    #[test]
    fn generated_secret_is_persisted_and_cached() {
        let s = secrets();
        let first = s.jwt_secret().unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(s.jwt_secret().unwrap(), first);
    }

    #[test]
    fn configured_secret_wins() {
        let library = Library::open_in_memory(std::path::Path::new("/tmp")).unwrap();
        let s = Secrets::new(library, Some("configured".to_string()), None);
        assert_eq!(s.jwt_secret().unwrap(), "configured");
    }

    #[test]
    fn password_round_trip() {
        let s = secrets();
        let stored = s.encrypt_password("hunter2").unwrap();
        assert!(stored.starts_with("enc:"));
        assert_eq!(s.reveal_password(&stored).unwrap(), "hunter2");
    }

    #[test]
    fn clear_text_password_passes_through() {
        let s = secrets();
        assert_eq!(s.reveal_password("plain").unwrap(), "plain");
    }

    #[test]
    fn nonce_makes_ciphertexts_differ() {
        let s = secrets();
        let a = s.encrypt_password("same").unwrap();
        let b = s.encrypt_password("same").unwrap();
        assert_ne!(a, b);
        assert_eq!(s.reveal_password(&a).unwrap(), "same");
        assert_eq!(s.reveal_password(&b).unwrap(), "same");
    }
}

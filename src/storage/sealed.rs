use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Store;
use crate::error::StorageError;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedValue {
    data: String,
    nonce: String,
}

/// AES-256-GCM sealing for values written to disk.
pub struct Sealer {
    key: [u8; KEY_SIZE],
}

impl Sealer {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Derives the key as SHA-256 of the passphrase.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        Self { key }
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, StorageError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| StorageError::Crypto(format!("Encryption error: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let encrypted = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| StorageError::Crypto(format!("Encryption failed: {}", e)))?;

        let sealed = SealedValue {
            data: BASE64.encode(encrypted),
            nonce: BASE64.encode(nonce_bytes),
        };
        Ok(serde_json::to_string(&sealed)?)
    }

    pub fn open(&self, sealed: &str) -> Result<String, StorageError> {
        let sealed: SealedValue = serde_json::from_str(sealed)?;

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| StorageError::Crypto(format!("Decryption error: {}", e)))?;

        let nonce_bytes = BASE64.decode(&sealed.nonce)
            .map_err(|e| StorageError::Crypto(format!("Invalid nonce: {}", e)))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(StorageError::Crypto("Invalid nonce length".to_string()));
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let data = BASE64.decode(&sealed.data)
            .map_err(|e| StorageError::Crypto(format!("Invalid sealed data: {}", e)))?;

        let decrypted = cipher
            .decrypt(nonce, data.as_ref())
            .map_err(|e| StorageError::Crypto(format!("Decryption failed: {}", e)))?;

        String::from_utf8(decrypted)
            .map_err(|e| StorageError::Crypto(format!("Invalid UTF-8: {}", e)))
    }
}

/// Wraps another store so that only sealed values reach it.
pub struct SealedStore<S> {
    inner: S,
    sealer: Sealer,
}

impl<S: Store> SealedStore<S> {
    pub fn new(inner: S, sealer: Sealer) -> Self {
        Self { inner, sealer }
    }
}

#[async_trait]
impl<S: Store> Store for SealedStore<S> {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.inner.get(key).await? {
            Some(sealed) => Ok(Some(self.sealer.open(&sealed)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let sealed = self.sealer.seal(value)?;
        self.inner.set(key, &sealed).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, AUTH_TOKEN_KEY};

    fn generate_test_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    #[test]
    fn test_seal_and_open() {
        let sealer = Sealer::new(generate_test_key());

        let token = "eyJhbGciOiJIUzI1NiJ9.payload.sig";
        let sealed = sealer.seal(token).unwrap();
        assert!(!sealed.contains(token));
        assert_eq!(sealer.open(&sealed).unwrap(), token);

        // fresh nonce per write
        assert_ne!(sealer.seal(token).unwrap(), sealed);
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let sealed = Sealer::from_passphrase("first").seal("secret").unwrap();
        let result = Sealer::from_passphrase("second").open(&sealed);
        assert!(matches!(result, Err(StorageError::Crypto(_))));
    }

    #[tokio::test]
    async fn test_sealed_store_hides_values() {
        let inner = MemoryStore::new();
        let store = SealedStore::new(inner.clone(), Sealer::from_passphrase("vault"));

        store.set(AUTH_TOKEN_KEY, "token-123").await.unwrap();

        let raw = inner.get(AUTH_TOKEN_KEY).await.unwrap().unwrap();
        assert!(!raw.contains("token-123"));
        assert_eq!(store.get(AUTH_TOKEN_KEY).await.unwrap().as_deref(), Some("token-123"));

        store.remove(AUTH_TOKEN_KEY).await.unwrap();
        assert_eq!(store.get(AUTH_TOKEN_KEY).await.unwrap(), None);
    }
}

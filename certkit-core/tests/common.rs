//! Common test utilities shared across integration tests.

use std::sync::Arc;

use certkit_core::keys::SealedMacKeystore;
use certkit_core::platform::memory::{MemoryBlobStore, MemoryStatusFileStore};
use certkit_core::platform::{DeviceKeystore, Sha256NameHasher, StatusFileStore};
use certkit_core::{StatusError, StatusResult, StatusService};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};

/// Device keystore backed by XChaCha20-Poly1305 with a random key.
pub struct AeadKeystore {
    key: [u8; 32],
}

impl AeadKeystore {
    /// Creates a keystore with a fresh random key.
    pub fn new() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }
}

impl Default for AeadKeystore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceKeystore for AeadKeystore {
    fn seal(&self, associated_data: &[u8], plaintext: &[u8]) -> StatusResult<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&self.key));
        let mut nonce_bytes = [0u8; 24];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|err| StatusError::Crypto(err.to_string()))?;
        let mut out = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, associated_data: &[u8], ciphertext: &[u8]) -> StatusResult<Vec<u8>> {
        if ciphertext.len() < 24 {
            return Err(StatusError::Keystore(
                "keystore ciphertext too short".to_string(),
            ));
        }
        let (nonce_bytes, payload) = ciphertext.split_at(24);
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&self.key));
        cipher
            .decrypt(
                XNonce::from_slice(nonce_bytes),
                Payload {
                    msg: payload,
                    aad: associated_data,
                },
            )
            .map_err(|err| StatusError::Keystore(err.to_string()))
    }
}

/// Device state that outlives a single service instance, so tests can
/// restart the service against the same key and files.
#[allow(dead_code, reason = "used in tests")]
pub struct TestDevice {
    /// Device keystore.
    pub keystore: AeadKeystore,
    /// Sealed blob storage.
    pub blob_store: MemoryBlobStore,
    /// Status file storage.
    pub files: Arc<MemoryStatusFileStore>,
}

#[allow(dead_code, reason = "used in tests")]
impl TestDevice {
    /// Creates a device with fresh key and empty storage.
    pub fn new() -> Self {
        Self {
            keystore: AeadKeystore::new(),
            blob_store: MemoryBlobStore::new(),
            files: Arc::new(MemoryStatusFileStore::new()),
        }
    }

    /// Starts a service over this device's key and files.
    pub fn start(&self) -> StatusResult<StatusService> {
        let mac_keys = SealedMacKeystore::init(&self.keystore, &self.blob_store, 1_700_000_000)?;
        StatusService::init_all(
            Arc::clone(&self.files) as Arc<dyn StatusFileStore>,
            Arc::new(mac_keys),
            Arc::new(Sha256NameHasher),
        )
    }
}

impl Default for TestDevice {
    fn default() -> Self {
        Self::new()
    }
}

//! In-memory implementations of platform traits for testing.
//!
//! These implementations are NOT secure for production use. They are
//! designed for unit and integration testing of the status index.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{StatusError, StatusResult};
use crate::status::StoreKind;

use super::{AtomicBlobStore, DeviceKeystore, IntegrityKeystore, StatusFileStore};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 8;
const TAG_LEN: usize = 32;

fn random_array<const N: usize>() -> StatusResult<[u8; N]> {
    let mut out = [0u8; N];
    OsRng
        .try_fill_bytes(&mut out)
        .map_err(|err| StatusError::Crypto(format!("OS RNG failed: {err}")))?;
    Ok(out)
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> StatusResult<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| StatusError::Crypto(format!("invalid HMAC key: {err}")))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

// =============================================================================
// Memory Keystore
// =============================================================================

/// In-memory device keystore using a fixed test key.
///
/// **FOR TESTING ONLY**. "Encrypts" by XOR-ing data with a keystream derived
/// from the key, associated data and an 8-byte nonce, then appends an
/// HMAC-SHA256 tag so that wrong associated data or tampering fails to open.
///
/// Layout: `nonce(8) || ciphertext || tag(32)`.
pub struct MemoryKeystore {
    key: [u8; 32],
}

impl MemoryKeystore {
    /// Creates a new memory keystore with a default test key.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            // Fixed test key - DO NOT USE IN PRODUCTION
            key: [
                0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C,
                0x0D, 0x0E, 0x0F, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19,
                0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F,
            ],
        }
    }

    /// Creates a new memory keystore with a custom key.
    #[must_use]
    pub const fn with_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    fn keystream(&self, ad: &[u8], nonce: &[u8], len: usize) -> StatusResult<Vec<u8>> {
        let mut keystream = Vec::with_capacity(len + 32);
        let mut counter = 0u64;
        while keystream.len() < len {
            let counter_bytes = counter.to_le_bytes();
            let block = hmac_sha256(
                &self.key,
                &[b"stream".as_slice(), ad, nonce, counter_bytes.as_slice()],
            )?;
            keystream.extend_from_slice(&block);
            counter += 1;
        }
        keystream.truncate(len);
        Ok(keystream)
    }
}

impl Default for MemoryKeystore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceKeystore for MemoryKeystore {
    fn seal(&self, associated_data: &[u8], plaintext: &[u8]) -> StatusResult<Vec<u8>> {
        let nonce: [u8; NONCE_LEN] = random_array()?;
        let keystream = self.keystream(associated_data, &nonce, plaintext.len())?;

        let mut out = Vec::with_capacity(NONCE_LEN + plaintext.len() + TAG_LEN);
        out.extend_from_slice(&nonce);
        out.extend(plaintext.iter().zip(keystream.iter()).map(|(p, k)| p ^ k));
        let tag = hmac_sha256(
            &self.key,
            &[b"tag".as_slice(), associated_data, out.as_slice()],
        )?;
        out.extend_from_slice(&tag);
        Ok(out)
    }

    fn open(&self, associated_data: &[u8], ciphertext: &[u8]) -> StatusResult<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(StatusError::Keystore("ciphertext too short".to_string()));
        }
        let (body, tag) = ciphertext.split_at(ciphertext.len() - TAG_LEN);
        let expected = hmac_sha256(&self.key, &[b"tag".as_slice(), associated_data, body])?;
        if !bool::from(expected.as_slice().ct_eq(tag)) {
            return Err(StatusError::Keystore("authentication failed".to_string()));
        }

        let (nonce, encrypted) = body.split_at(NONCE_LEN);
        let keystream = self.keystream(associated_data, nonce, encrypted.len())?;
        Ok(encrypted
            .iter()
            .zip(keystream.iter())
            .map(|(c, k)| c ^ k)
            .collect())
    }
}

// =============================================================================
// Memory Integrity Keystore
// =============================================================================

/// In-memory integrity keystore with a random per-instance key.
///
/// Every alias is keyed by HMAC-SHA256 over the alias under the instance key.
pub struct MemoryIntegrityKeystore {
    key: [u8; 32],
}

impl MemoryIntegrityKeystore {
    /// Creates a keystore with a fresh random key.
    ///
    /// # Panics
    ///
    /// Panics if the OS random number generator fails.
    #[must_use]
    pub fn new() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Creates a keystore with a fixed key, so separate instances agree.
    #[must_use]
    pub const fn with_key(key: [u8; 32]) -> Self {
        Self { key }
    }
}

impl Default for MemoryIntegrityKeystore {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrityKeystore for MemoryIntegrityKeystore {
    fn mac(&self, alias: &str, data: &[u8]) -> StatusResult<[u8; 32]> {
        let alias_key = hmac_sha256(&self.key, &[alias.as_bytes()])?;
        hmac_sha256(&alias_key, &[data])
    }

    fn random_bytes(&self, len: usize) -> StatusResult<Vec<u8>> {
        let mut out = vec![0u8; len];
        OsRng
            .try_fill_bytes(&mut out)
            .map_err(|err| StatusError::Crypto(format!("OS RNG failed: {err}")))?;
        Ok(out)
    }
}

// =============================================================================
// Memory Blob Store
// =============================================================================

/// In-memory atomic blob store backed by a `HashMap`.
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Creates a new empty memory blob store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicBlobStore for MemoryBlobStore {
    fn read(&self, name: &str) -> StatusResult<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .read()
            .map_err(|_| StatusError::poisoned("blob store"))?
            .get(name)
            .cloned())
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> StatusResult<()> {
        self.blobs
            .write()
            .map_err(|_| StatusError::poisoned("blob store"))?
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}

// =============================================================================
// Memory Status File Store
// =============================================================================

/// In-memory status file store.
///
/// Counts writes so tests can assert that no-op updates never touch storage,
/// exposes the raw bytes for tampering, and can be told to fail writes.
pub struct MemoryStatusFileStore {
    files: RwLock<HashMap<StoreKind, Vec<u8>>>,
    write_count: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryStatusFileStore {
    /// Creates a store with no files.
    #[must_use]
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            write_count: AtomicU64::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Number of successful writes across all store kinds.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }

    /// Makes subsequent writes fail with an I/O error while `fail` is set.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns a copy of the current bytes of `kind`'s file.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn contents(&self, kind: StoreKind) -> StatusResult<Option<Vec<u8>>> {
        self.read(kind)
    }

    /// Replaces the bytes of `kind`'s file without counting a write.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn overwrite(&self, kind: StoreKind, bytes: Vec<u8>) -> StatusResult<()> {
        self.files
            .write()
            .map_err(|_| StatusError::poisoned("status file store"))?
            .insert(kind, bytes);
        Ok(())
    }
}

impl Default for MemoryStatusFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusFileStore for MemoryStatusFileStore {
    fn read(&self, kind: StoreKind) -> StatusResult<Option<Vec<u8>>> {
        Ok(self
            .files
            .read()
            .map_err(|_| StatusError::poisoned("status file store"))?
            .get(&kind)
            .cloned())
    }

    fn write(&self, kind: StoreKind, bytes: &[u8]) -> StatusResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StatusError::io(
                format!("write {kind} status file"),
                std::io::Error::other("injected write failure"),
            ));
        }
        self.files
            .write()
            .map_err(|_| StatusError::poisoned("status file store"))?
            .insert(kind, bytes.to_vec());
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Memory Platform Bundle
// =============================================================================

/// Combines all in-memory implementations for easy test setup.
///
/// # Example
///
/// ```
/// use certkit_core::platform::MemoryPlatform;
///
/// let platform = MemoryPlatform::new();
///
/// // Use platform.keystore, platform.file_store, etc.
/// ```
pub struct MemoryPlatform {
    /// In-memory device keystore.
    pub keystore: Arc<MemoryKeystore>,
    /// In-memory blob store.
    pub blob_store: Arc<MemoryBlobStore>,
    /// In-memory status file store.
    pub file_store: Arc<MemoryStatusFileStore>,
}

impl MemoryPlatform {
    /// Creates a new memory platform with default components.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keystore: Arc::new(MemoryKeystore::new()),
            blob_store: Arc::new(MemoryBlobStore::new()),
            file_store: Arc::new(MemoryStatusFileStore::new()),
        }
    }
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_keystore_roundtrip() {
        let keystore = MemoryKeystore::new();
        let plaintext = b"hello, world!";
        let ad = b"test-associated-data";

        let ciphertext = keystore.seal(ad, plaintext).unwrap();
        assert_eq!(ciphertext.len(), NONCE_LEN + plaintext.len() + TAG_LEN);
        assert_ne!(&ciphertext[NONCE_LEN..NONCE_LEN + plaintext.len()], plaintext);

        let decrypted = keystore.open(ad, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_memory_keystore_different_ad() {
        let keystore = MemoryKeystore::new();
        let ciphertext = keystore.seal(b"context-1", b"secret data").unwrap();

        let result = keystore.open(b"context-2", &ciphertext);
        assert!(matches!(result, Err(StatusError::Keystore(_))));
    }

    #[test]
    fn test_memory_keystore_tampered_ciphertext() {
        let keystore = MemoryKeystore::new();
        let mut ciphertext = keystore.seal(b"ad", b"secret data").unwrap();
        ciphertext[NONCE_LEN] ^= 0x01;
        assert!(keystore.open(b"ad", &ciphertext).is_err());
    }

    #[test]
    fn test_memory_keystore_short_ciphertext() {
        let keystore = MemoryKeystore::new();
        let result = keystore.open(b"ad", &[1, 2, 3, 4, 5, 6, 7]);
        assert!(result.is_err());
    }

    #[test]
    fn test_memory_integrity_keystore_aliases_are_separated() {
        let keystore = MemoryIntegrityKeystore::with_key([7u8; 32]);
        let a = keystore.mac("alias-a", b"data").unwrap();
        let b = keystore.mac("alias-b", b"data").unwrap();
        assert_ne!(a, b);
        let again = MemoryIntegrityKeystore::with_key([7u8; 32]);
        assert_eq!(a, again.mac("alias-a", b"data").unwrap());
        assert_eq!(keystore.random_bytes(32).unwrap().len(), 32);
    }

    #[test]
    fn test_memory_blob_store_basic() {
        let store = MemoryBlobStore::new();
        assert!(store.read("test").unwrap().is_none());

        store.write_atomic("test", b"hello").unwrap();
        assert_eq!(store.read("test").unwrap(), Some(b"hello".to_vec()));

        store.write_atomic("test", b"world").unwrap();
        assert_eq!(store.read("test").unwrap(), Some(b"world".to_vec()));
        assert!(store.read("other").unwrap().is_none());
    }

    #[test]
    fn test_memory_status_file_store_counts_writes() {
        let store = MemoryStatusFileStore::new();
        assert!(store.read(StoreKind::UserTrusted).unwrap().is_none());

        store.write(StoreKind::UserTrusted, b"one").unwrap();
        store.write(StoreKind::SystemTrusted, b"two").unwrap();
        assert_eq!(store.write_count(), 2);

        store.overwrite(StoreKind::UserTrusted, b"tampered".to_vec()).unwrap();
        assert_eq!(store.write_count(), 2);
        assert_eq!(
            store.contents(StoreKind::UserTrusted).unwrap(),
            Some(b"tampered".to_vec())
        );
    }

    #[test]
    fn test_memory_status_file_store_injected_failure() {
        let store = MemoryStatusFileStore::new();
        store.set_fail_writes(true);
        let result = store.write(StoreKind::AppPrivateCredential, b"x");
        assert!(matches!(result, Err(StatusError::Io { .. })));
        assert_eq!(store.write_count(), 0);

        store.set_fail_writes(false);
        store.write(StoreKind::AppPrivateCredential, b"x").unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_memory_status_file_store_thread_safety() {
        use std::thread;

        let store = Arc::new(MemoryStatusFileStore::new());
        let mut handles = vec![];
        for i in 0..10u8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store.write(StoreKind::UserTrusted, &[i]).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.write_count(), 10);
    }
}

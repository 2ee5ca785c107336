//! Status MAC key management.
//!
//! A single 32-byte key authenticates all three status files. It is created
//! on first start, sealed with the [`DeviceKeystore`] and stored as a
//! CBOR envelope in the [`AtomicBlobStore`]. Later starts open the same
//! envelope.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{StatusError, StatusResult};
use crate::platform::{AtomicBlobStore, DeviceKeystore, IntegrityKeystore};

/// Blob name of the sealed MAC key envelope.
pub const STATUS_MAC_KEY_FILENAME: &str = "status_mac_key.bin";

/// Associated data binding the sealed key to its purpose.
pub const STATUS_MAC_KEY_ENVELOPE_AD: &[u8] = b"certkit:status-mac-key-envelope";

const ENVELOPE_VERSION: u32 = 1;

#[derive(Clone, Serialize, Deserialize)]
struct MacKeyEnvelope {
    version: u32,
    wrapped_key: Vec<u8>,
    created_at: u64,
}

impl MacKeyEnvelope {
    const fn new(wrapped_key: Vec<u8>, now: u64) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            wrapped_key,
            created_at: now,
        }
    }

    fn serialize(&self) -> StatusResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|err| StatusError::Serialization(err.to_string()))?;
        Ok(bytes)
    }

    fn deserialize(bytes: &[u8]) -> StatusResult<Self> {
        let envelope: Self = ciborium::de::from_reader(bytes)
            .map_err(|err| StatusError::Serialization(err.to_string()))?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(StatusError::UnsupportedEnvelopeVersion(envelope.version));
        }
        Ok(envelope)
    }
}

/// [`IntegrityKeystore`] backed by the sealed status MAC key.
///
/// `mac(alias, data)` is HMAC-SHA256 under an HKDF-SHA256 subkey of the
/// stored key, with the alias as HKDF `info`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SealedMacKeystore {
    key: [u8; 32],
}

impl SealedMacKeystore {
    /// Opens the sealed MAC key, creating and persisting it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope cannot be read, opened or parsed, or
    /// if persisting a new envelope fails.
    pub fn init(
        keystore: &dyn DeviceKeystore,
        blob_store: &dyn AtomicBlobStore,
        now: u64,
    ) -> StatusResult<Self> {
        if let Some(bytes) = blob_store.read(STATUS_MAC_KEY_FILENAME)? {
            let envelope = MacKeyEnvelope::deserialize(&bytes)?;
            let key_bytes =
                Zeroizing::new(keystore.open(STATUS_MAC_KEY_ENVELOPE_AD, &envelope.wrapped_key)?);
            let key = parse_key_32(&key_bytes)?;
            log::debug!("opened status MAC key created at {}", envelope.created_at);
            Ok(Self { key })
        } else {
            let key = random_key()?;
            let wrapped_key = keystore.seal(STATUS_MAC_KEY_ENVELOPE_AD, &key)?;
            let bytes = MacKeyEnvelope::new(wrapped_key, now).serialize()?;
            blob_store.write_atomic(STATUS_MAC_KEY_FILENAME, &bytes)?;
            log::info!("created status MAC key");
            Ok(Self { key })
        }
    }

    fn subkey(&self, alias: &str) -> StatusResult<Zeroizing<[u8; 32]>> {
        let hkdf = Hkdf::<Sha256>::new(None, &self.key);
        let mut okm = Zeroizing::new([0u8; 32]);
        hkdf.expand(alias.as_bytes(), okm.as_mut_slice())
            .map_err(|err| StatusError::Crypto(format!("HKDF expand failed: {err}")))?;
        Ok(okm)
    }
}

impl IntegrityKeystore for SealedMacKeystore {
    fn mac(&self, alias: &str, data: &[u8]) -> StatusResult<[u8; 32]> {
        let subkey = self.subkey(alias)?;
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(subkey.as_slice())
            .map_err(|err| StatusError::Crypto(format!("invalid HMAC key: {err}")))?;
        mac.update(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }

    fn random_bytes(&self, len: usize) -> StatusResult<Vec<u8>> {
        let mut out = vec![0u8; len];
        OsRng
            .try_fill_bytes(&mut out)
            .map_err(|err| StatusError::Crypto(format!("OS RNG failed: {err}")))?;
        Ok(out)
    }
}

impl std::fmt::Debug for SealedMacKeystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedMacKeystore")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn random_key() -> StatusResult<[u8; 32]> {
    let mut key = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut key)
        .map_err(|err| StatusError::Crypto(format!("OS RNG failed: {err}")))?;
    Ok(key)
}

fn parse_key_32(bytes: &[u8]) -> StatusResult<[u8; 32]> {
    if bytes.len() != 32 {
        return Err(StatusError::Keystore(format!(
            "status MAC key length mismatch: expected 32, got {}",
            bytes.len()
        )));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    Ok(out)
}

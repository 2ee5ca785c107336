//! Integrity envelope for persisted status payloads.
//!
//! # Binary Layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     version (u32 LE, currently 1)
//! 4       32    tag (HMAC over salt || payload)
//! 36      32    salt (random per write)
//! 68      N     payload (see `codec`)
//! ```
//!
//! The tag is computed by the [`IntegrityKeystore`] under a single,
//! store-independent key alias. Verification compares tags in constant time
//! and fails closed: on any mismatch no byte of the payload is returned.

use std::sync::Arc;

use subtle::ConstantTimeEq;

use crate::error::{StatusError, StatusResult};
use crate::platform::IntegrityKeystore;

/// Current status file format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the MAC tag in bytes.
pub const TAG_SIZE: usize = 32;

/// Size of the per-write salt in bytes.
pub const SALT_SIZE: usize = 32;

/// Size of the fixed header preceding the payload.
pub const HEADER_SIZE: usize = 4 + TAG_SIZE + SALT_SIZE;

/// Key alias under which status files are authenticated.
pub const STATUS_MAC_KEY_ALIAS: &str = "certkit:status-mac-key";

/// Wraps and verifies status payloads.
#[derive(Clone)]
pub struct IntegrityEnvelope {
    keystore: Arc<dyn IntegrityKeystore>,
}

impl IntegrityEnvelope {
    /// Creates an envelope backed by `keystore`.
    #[must_use]
    pub fn new(keystore: Arc<dyn IntegrityKeystore>) -> Self {
        Self { keystore }
    }

    /// Produces the full file contents for `payload` with a fresh salt.
    ///
    /// # Errors
    ///
    /// Returns an error if randomness or the MAC cannot be obtained.
    pub fn wrap(&self, payload: &[u8]) -> StatusResult<Vec<u8>> {
        let salt = self.keystore.random_bytes(SALT_SIZE)?;
        if salt.len() != SALT_SIZE {
            return Err(StatusError::Crypto(format!(
                "salt length mismatch: expected {SALT_SIZE}, got {}",
                salt.len()
            )));
        }
        let tag = self.tag(&salt, payload)?;

        let mut out = Vec::new();
        out.try_reserve_exact(HEADER_SIZE + payload.len())
            .map_err(|_| StatusError::AllocationFailed)?;
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&tag);
        out.extend_from_slice(&salt);
        out.extend_from_slice(payload);
        Ok(out)
    }

    /// Verifies `file` and returns the payload it protects.
    ///
    /// # Errors
    ///
    /// - [`StatusError::IntegrityMismatch`] if the file is shorter than the
    ///   header or the tag does not verify
    /// - [`StatusError::UnsupportedVersion`] for any version other than
    ///   [`FORMAT_VERSION`]
    /// - keystore errors while computing the expected tag
    pub fn unwrap<'a>(&self, file: &'a [u8]) -> StatusResult<&'a [u8]> {
        if file.len() < HEADER_SIZE {
            return Err(StatusError::IntegrityMismatch(format!(
                "status file is {} bytes, header needs {HEADER_SIZE}",
                file.len()
            )));
        }

        let version = u32::from_le_bytes([file[0], file[1], file[2], file[3]]);
        if version != FORMAT_VERSION {
            return Err(StatusError::UnsupportedVersion(version));
        }

        let stored_tag = &file[4..4 + TAG_SIZE];
        let salt = &file[4 + TAG_SIZE..HEADER_SIZE];
        let payload = &file[HEADER_SIZE..];

        let expected = self.tag(salt, payload)?;
        if !bool::from(expected.as_slice().ct_eq(stored_tag)) {
            return Err(StatusError::IntegrityMismatch(
                "status file tag does not verify".to_string(),
            ));
        }
        Ok(payload)
    }

    fn tag(&self, salt: &[u8], payload: &[u8]) -> StatusResult<[u8; TAG_SIZE]> {
        let mut data = Vec::new();
        data.try_reserve_exact(salt.len() + payload.len())
            .map_err(|_| StatusError::AllocationFailed)?;
        data.extend_from_slice(salt);
        data.extend_from_slice(payload);
        self.keystore.mac(STATUS_MAC_KEY_ALIAS, &data)
    }
}

impl std::fmt::Debug for IntegrityEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityEnvelope")
            .field("alias", &STATUS_MAC_KEY_ALIAS)
            .finish_non_exhaustive()
    }
}

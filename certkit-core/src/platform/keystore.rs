//! Keystore traits for MAC key protection and integrity tags.

use crate::error::StatusResult;

/// Device-protected encryption used to seal the status MAC key at rest.
///
/// Platform implementations should use hardware-backed keystores where
/// available. The key MUST be bound to the device and implementations MUST
/// use authenticated encryption: opening with different associated data, or
/// opening tampered ciphertext, must fail.
pub trait DeviceKeystore: Send + Sync {
    /// Encrypts plaintext with the device-bound key.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails (e.g., keystore unavailable).
    fn seal(&self, associated_data: &[u8], plaintext: &[u8]) -> StatusResult<Vec<u8>>;

    /// Decrypts ciphertext with the device-bound key.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails, the ciphertext is malformed,
    /// or the keystore is unavailable.
    fn open(&self, associated_data: &[u8], ciphertext: &[u8]) -> StatusResult<Vec<u8>>;
}

/// Keyed MAC and randomness used by the integrity envelope.
///
/// Keys are referenced by alias and never leave the implementation.
pub trait IntegrityKeystore: Send + Sync {
    /// Computes a 32-byte MAC over `data` with the key named by `alias`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unavailable or the MAC cannot be computed.
    fn mac(&self, alias: &str, data: &[u8]) -> StatusResult<[u8; 32]>;

    /// Returns `len` bytes from a cryptographically secure source.
    ///
    /// # Errors
    ///
    /// Returns an error if the random source fails.
    fn random_bytes(&self, len: usize) -> StatusResult<Vec<u8>>;
}

//! Atomic blob store trait for small file operations.
//!
//! The blob store holds the sealed MAC key envelope (`status_mac_key.bin`).

use crate::error::StatusResult;

/// Atomic storage for small files.
///
/// Writes MUST be atomic (write to a temporary file, `fsync`, rename) so the
/// blob is always either the complete old content or the complete new
/// content. Losing the MAC key envelope makes every status file unreadable.
pub trait AtomicBlobStore: Send + Sync {
    /// Reads a blob by name.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` if the blob exists
    /// - `Ok(None)` if the blob does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails (e.g., I/O error, permission denied).
    fn read(&self, name: &str) -> StatusResult<Option<Vec<u8>>>;

    /// Atomically writes a blob, replacing any existing content.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_atomic(&self, name: &str, bytes: &[u8]) -> StatusResult<()>;
}

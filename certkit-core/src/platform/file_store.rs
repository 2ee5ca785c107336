//! Status file store trait.

use crate::error::StatusResult;
use crate::status::StoreKind;

/// Whole-file storage for the three status files, one per [`StoreKind`].
///
/// Each store kind maps to one fixed location. Writes replace the whole file
/// (create/truncate, write, `fsync`, close); they are not required to be
/// atomic with respect to crashes, which the integrity envelope detects on
/// the next load.
pub trait StatusFileStore: Send + Sync {
    /// Reads the status file of `kind`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` if the file exists (possibly empty)
    /// - `Ok(None)` if the file does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    fn read(&self, kind: StoreKind) -> StatusResult<Option<Vec<u8>>>;

    /// Replaces the status file of `kind` with `bytes` and syncs it.
    ///
    /// # Errors
    ///
    /// Returns an error if any step of the rewrite fails.
    fn write(&self, kind: StoreKind, bytes: &[u8]) -> StatusResult<()>;
}

//! Process-wide status service over the three store kinds.

use std::sync::{Arc, RwLock};

use crate::envelope::IntegrityEnvelope;
use crate::error::{StatusError, StatusResult};
use crate::keys::SealedMacKeystore;
use crate::paths::StatusPaths;
use crate::platform::{
    AtomicBlobStore, DeviceKeystore, FsStatusFileStore, IntegrityKeystore, NameHasher,
    Sha256NameHasher, StatusFileStore,
};

use super::cert_index::{CertStatusIndex, StatusChange};
use super::types::{Scope, Status, StatusEntry, StoreKind};

/// One store kind's index together with its two locks.
///
/// `tree` guards the in-memory index. `file` serializes rewrites of the
/// store's status file; it guards no data of its own.
struct StoreSlot {
    tree: RwLock<CertStatusIndex>,
    file: RwLock<()>,
}

/// Certificate status overrides for every store kind.
///
/// Construct once with [`StatusService::init_all`] (or [`StatusService::open`]
/// for the filesystem layout) and share it across threads.
pub struct StatusService {
    stores: [StoreSlot; 3],
    file_store: Arc<dyn StatusFileStore>,
    envelope: IntegrityEnvelope,
}

impl StatusService {
    /// Loads and verifies all three status files.
    ///
    /// A missing or empty file yields an empty index. Any verification or
    /// decode failure aborts the whole initialization.
    ///
    /// # Errors
    ///
    /// - [`StatusError::IntegrityMismatch`] or
    ///   [`StatusError::UnsupportedVersion`] for a file that fails
    ///   verification
    /// - [`StatusError::MalformedRecord`] for a verified payload that does
    ///   not decode
    /// - file store or keystore errors
    pub fn init_all(
        file_store: Arc<dyn StatusFileStore>,
        keystore: Arc<dyn IntegrityKeystore>,
        hasher: Arc<dyn NameHasher>,
    ) -> StatusResult<Self> {
        let envelope = IntegrityEnvelope::new(keystore);
        let stores = {
            let files = file_store.as_ref();
            let envelope = &envelope;
            let load = move |kind| Self::load_store(kind, files, envelope, &hasher);
            [
                load(StoreKind::SystemTrusted)?,
                load(StoreKind::UserTrusted)?,
                load(StoreKind::AppPrivateCredential)?,
            ]
        };
        Ok(Self {
            stores,
            file_store,
            envelope,
        })
    }

    /// Opens the service over the filesystem layout rooted at `paths`.
    ///
    /// The MAC key is opened from (or created in) `blob_store` and sealed
    /// with `device_keystore`. Names are hashed with SHA-256.
    ///
    /// # Errors
    ///
    /// Returns an error if the MAC key cannot be opened or created, or if
    /// [`init_all`](Self::init_all) fails.
    pub fn open(
        paths: StatusPaths,
        device_keystore: &dyn DeviceKeystore,
        blob_store: &dyn AtomicBlobStore,
        now: u64,
    ) -> StatusResult<Self> {
        let keystore = SealedMacKeystore::init(device_keystore, blob_store, now)?;
        Self::init_all(
            Arc::new(FsStatusFileStore::new(paths)),
            Arc::new(keystore),
            Arc::new(Sha256NameHasher),
        )
    }

    /// Status of `cert_file_name` in `kind` for `scope`.
    ///
    /// Takes only the store's tree lock, in read mode.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::InvalidInput`] for an invalid file name or
    /// [`StatusError::Lock`] if the tree lock is poisoned.
    pub fn get(&self, kind: StoreKind, scope: Scope, cert_file_name: &str) -> StatusResult<Status> {
        let tree = self
            .slot(kind)
            .tree
            .read()
            .map_err(|_| StatusError::poisoned("status tree"))?;
        tree.get_status(scope, cert_file_name)
    }

    /// Records `status` for `cert_file_name` in `kind` and persists the
    /// store when the index changed.
    ///
    /// The file lock is taken before the snapshot is read, so the last
    /// completed write always reflects every mutation whose `set` returned.
    ///
    /// # Errors
    ///
    /// - [`StatusError::InvalidInput`] for an invalid file name
    /// - [`StatusError::TooLarge`] if the store no longer fits in a file; the
    ///   file is not written
    /// - file store errors from the rewrite
    ///
    /// A failed rewrite leaves the in-memory index ahead of the file until
    /// the next successful `set` on the same store.
    pub fn set(
        &self,
        kind: StoreKind,
        scope: Scope,
        cert_file_name: &str,
        status: Status,
    ) -> StatusResult<StatusChange> {
        let slot = self.slot(kind);
        let change = slot
            .tree
            .write()
            .map_err(|_| StatusError::poisoned("status tree"))?
            .set_status(scope, cert_file_name, status)?;
        if !change.is_changed() {
            return Ok(change);
        }

        let _file = slot
            .file
            .write()
            .map_err(|_| StatusError::poisoned("status file"))?;
        let payload = slot
            .tree
            .read()
            .map_err(|_| StatusError::poisoned("status tree"))?
            .to_payload()
            .inspect_err(|err| {
                log::error!("{kind}: status snapshot not persisted: {err}");
            })?;
        let bytes = self.envelope.wrap(&payload).inspect_err(|err| {
            log::error!("{kind}: failed to seal status file: {err}");
        })?;
        self.file_store.write(kind, &bytes).inspect_err(|err| {
            log::error!("{kind}: failed to rewrite status file: {err}");
        })?;
        Ok(change)
    }

    /// All overrides recorded in `kind`, in index order.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::Lock`] if the tree lock is poisoned.
    pub fn list_overrides(&self, kind: StoreKind) -> StatusResult<Vec<StatusEntry>> {
        Ok(self
            .slot(kind)
            .tree
            .read()
            .map_err(|_| StatusError::poisoned("status tree"))?
            .entries())
    }

    /// Number of overrides recorded in `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::Lock`] if the tree lock is poisoned.
    pub fn override_count(&self, kind: StoreKind) -> StatusResult<usize> {
        Ok(self
            .slot(kind)
            .tree
            .read()
            .map_err(|_| StatusError::poisoned("status tree"))?
            .len())
    }

    const fn slot(&self, kind: StoreKind) -> &StoreSlot {
        &self.stores[kind.index()]
    }

    fn load_store(
        kind: StoreKind,
        file_store: &dyn StatusFileStore,
        envelope: &IntegrityEnvelope,
        hasher: &Arc<dyn NameHasher>,
    ) -> StatusResult<StoreSlot> {
        let report = |err: &StatusError| {
            if err.is_untrusted_data() {
                log::warn!("{kind}: status file rejected: {err}");
            } else {
                log::error!("{kind}: failed to load status file: {err}");
            }
        };
        let file = file_store
            .read(kind)
            .inspect_err(report)?
            .filter(|bytes| !bytes.is_empty());
        let index = match file {
            None => CertStatusIndex::new(kind, Arc::clone(hasher)),
            Some(bytes) => {
                let payload = envelope.unwrap(&bytes).inspect_err(report)?;
                CertStatusIndex::from_payload(kind, Arc::clone(hasher), payload)
                    .inspect_err(report)?
            }
        };
        log::info!("{kind}: loaded {} status overrides", index.len());
        Ok(StoreSlot {
            tree: RwLock::new(index),
            file: RwLock::new(()),
        })
    }
}

impl std::fmt::Debug for StatusService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusService")
            .field("envelope", &self.envelope)
            .finish_non_exhaustive()
    }
}

//! Filesystem-backed status file store.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};

use crate::codec::MAX_PAYLOAD_SIZE;
use crate::envelope::HEADER_SIZE;
use crate::error::{StatusError, StatusResult};
use crate::paths::StatusPaths;
use crate::status::StoreKind;

use super::StatusFileStore;

/// Status files on the local filesystem, laid out by [`StatusPaths`].
///
/// Rewrites truncate the file in place and `fsync` it; they do not go through
/// a temporary file and rename.
#[derive(Debug, Clone)]
pub struct FsStatusFileStore {
    paths: StatusPaths,
}

impl FsStatusFileStore {
    /// Creates a store over `paths`. Nothing is touched on disk until the
    /// first read or write.
    #[must_use]
    pub const fn new(paths: StatusPaths) -> Self {
        Self { paths }
    }

    /// Returns the configured paths.
    #[must_use]
    pub const fn paths(&self) -> &StatusPaths {
        &self.paths
    }
}

impl StatusFileStore for FsStatusFileStore {
    fn read(&self, kind: StoreKind) -> StatusResult<Option<Vec<u8>>> {
        let path = self.paths.status_file_path(kind);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StatusError::io(format!("open {}", path.display()), err)),
        };

        let limit = HEADER_SIZE + MAX_PAYLOAD_SIZE;
        let len = file
            .metadata()
            .map_err(|err| StatusError::io(format!("stat {}", path.display()), err))?
            .len();
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        if len > limit {
            return Err(StatusError::TooLarge { size: len, limit });
        }

        let mut bytes = Vec::with_capacity(len);
        file.read_to_end(&mut bytes)
            .map_err(|err| StatusError::io(format!("read {}", path.display()), err))?;
        Ok(Some(bytes))
    }

    fn write(&self, kind: StoreKind, bytes: &[u8]) -> StatusResult<()> {
        let path = self.paths.status_file_path(kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| StatusError::io(format!("create {}", parent.display()), err))?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|err| StatusError::io(format!("open {}", path.display()), err))?;
        file.write_all(bytes)
            .map_err(|err| StatusError::io(format!("write {}", path.display()), err))?;
        file.sync_all()
            .map_err(|err| StatusError::io(format!("sync {}", path.display()), err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsStatusFileStore::new(StatusPaths::new(dir.path()));
        assert!(store.read(StoreKind::UserTrusted).expect("read").is_none());
    }

    #[test]
    fn test_write_creates_directories_and_truncates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsStatusFileStore::new(StatusPaths::new(dir.path()));

        store
            .write(StoreKind::SystemTrusted, b"a longer first version")
            .expect("write");
        store.write(StoreKind::SystemTrusted, b"short").expect("rewrite");

        assert_eq!(
            store.read(StoreKind::SystemTrusted).expect("read"),
            Some(b"short".to_vec())
        );
        assert!(store.read(StoreKind::UserTrusted).expect("read").is_none());
        assert!(store
            .paths()
            .status_file_path(StoreKind::SystemTrusted)
            .exists());
    }

    #[test]
    fn test_oversized_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsStatusFileStore::new(StatusPaths::new(dir.path()));
        let path = store.paths().status_file_path(StoreKind::AppPrivateCredential);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        let file = File::create(&path).expect("create");
        file.set_len((HEADER_SIZE + MAX_PAYLOAD_SIZE + 1) as u64)
            .expect("set_len");

        let result = store.read(StoreKind::AppPrivateCredential);
        assert!(matches!(result, Err(StatusError::TooLarge { .. })));
    }
}

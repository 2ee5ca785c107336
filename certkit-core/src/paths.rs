//! Storage path helpers.

use std::path::{Path, PathBuf};

use crate::status::StoreKind;

const CERTKIT_DIRNAME: &str = "certkit";
const STATUS_DIRNAME: &str = "status";
const SYSTEM_TRUSTED_FILENAME: &str = "system_trusted.status";
const USER_TRUSTED_FILENAME: &str = "user_trusted.status";
const APP_CREDENTIAL_FILENAME: &str = "app_credential.status";

/// Paths for certificate status artifacts under `<root>/certkit/status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPaths {
    root: PathBuf,
    status_dir: PathBuf,
}

impl StatusPaths {
    /// Builds status paths rooted at `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let status_dir = root.join(CERTKIT_DIRNAME).join(STATUS_DIRNAME);
        Self { root, status_dir }
    }

    /// Returns the storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory holding the status files.
    #[must_use]
    pub fn status_dir(&self) -> &Path {
        &self.status_dir
    }

    /// Returns the path to the status file of `kind`.
    #[must_use]
    pub fn status_file_path(&self, kind: StoreKind) -> PathBuf {
        let name = match kind {
            StoreKind::SystemTrusted => SYSTEM_TRUSTED_FILENAME,
            StoreKind::UserTrusted => USER_TRUSTED_FILENAME,
            StoreKind::AppPrivateCredential => APP_CREDENTIAL_FILENAME,
        };
        self.status_dir.join(name)
    }
}

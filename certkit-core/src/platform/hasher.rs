//! Digest collaborator for index key derivation.

use sha2::{Digest, Sha256};

/// Digest of certificate file names.
///
/// Only the first four bytes are used to form an index key, so any
/// well-distributed digest works.
pub trait NameHasher: Send + Sync {
    /// Digests `name`.
    fn digest(&self, name: &[u8]) -> [u8; 32];
}

/// SHA-256 name digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256NameHasher;

impl NameHasher for Sha256NameHasher {
    fn digest(&self, name: &[u8]) -> [u8; 32] {
        let hash = Sha256::digest(name);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hash);
        out
    }
}

//! Per-store status index with hash-derived keys.

use std::sync::Arc;

use crate::codec;
use crate::error::StatusResult;
use crate::index::{BalancedIndex, NodeId, KEY_MASK};
use crate::platform::NameHasher;

use super::types::{validate_file_name, Scope, Status, StatusEntry, StatusEntryCodec, StoreKind};

/// Effect of a [`CertStatusIndex::set_status`] call on the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// The requested status was already in effect.
    Unchanged,
    /// A new override was recorded.
    Inserted,
    /// An existing override changed to another non-default status.
    Updated,
    /// An override was dropped because the default was requested.
    Removed,
}

impl StatusChange {
    /// Returns `true` if the index was modified.
    #[must_use]
    pub const fn is_changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Status overrides of one [`StoreKind`].
///
/// Only non-default statuses are stored. Keys are derived from the
/// certificate file name and may collide; lookups resolve collisions by
/// comparing the full name and the scope rules of the store kind.
pub struct CertStatusIndex {
    kind: StoreKind,
    tree: BalancedIndex<StatusEntry>,
    hasher: Arc<dyn NameHasher>,
}

impl CertStatusIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new(kind: StoreKind, hasher: Arc<dyn NameHasher>) -> Self {
        Self {
            kind,
            tree: BalancedIndex::new(),
            hasher,
        }
    }

    /// Rebuilds an index from a verified payload.
    ///
    /// # Errors
    ///
    /// Returns the decode error of the first bad record; nothing is kept.
    pub fn from_payload(
        kind: StoreKind,
        hasher: Arc<dyn NameHasher>,
        payload: &[u8],
    ) -> StatusResult<Self> {
        let tree = codec::decode(payload, &StatusEntryCodec)?;
        Ok(Self { kind, tree, hasher })
    }

    /// Serializes all overrides in key order.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::TooLarge`](crate::StatusError::TooLarge) when
    /// the payload would exceed [`codec::MAX_PAYLOAD_SIZE`].
    pub fn to_payload(&self) -> StatusResult<Vec<u8>> {
        codec::encode(&self.tree, &StatusEntryCodec)
    }

    /// Store kind of this index.
    #[must_use]
    pub const fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Number of recorded overrides.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` when no override is recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Derives the 31-bit index key of `name`.
    ///
    /// System-trusted names are subject-hash based and used directly: the
    /// first four bytes, big-endian, zero-padded on the right. Other stores
    /// take the first four bytes of the name digest.
    #[must_use]
    pub fn derive_key(&self, name: &str) -> u32 {
        let mut prefix = [0u8; 4];
        match self.kind {
            StoreKind::SystemTrusted => {
                let bytes = name.as_bytes();
                let n = bytes.len().min(4);
                prefix[..n].copy_from_slice(&bytes[..n]);
            }
            StoreKind::UserTrusted | StoreKind::AppPrivateCredential => {
                let digest = self.hasher.digest(name.as_bytes());
                prefix.copy_from_slice(&digest[..4]);
            }
        }
        u32::from_be_bytes(prefix) & KEY_MASK
    }

    /// Status of `name` for `scope`; [`Status::Enabled`] when no override
    /// matches.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::InvalidInput`](crate::StatusError::InvalidInput)
    /// for an invalid file name.
    pub fn get_status(&self, scope: Scope, name: &str) -> StatusResult<Status> {
        validate_file_name(name)?;
        let key = self.derive_key(name);
        Ok(self
            .find_matching(key, scope, name)
            .and_then(|id| self.tree.value(id))
            .map_or(Status::Enabled, |entry| entry.status))
    }

    /// Records `status` for `name` under `scope`.
    ///
    /// Setting the default removes the override, setting a status that is
    /// already in effect changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::InvalidInput`](crate::StatusError::InvalidInput)
    /// for an invalid file name, or
    /// [`StatusError::AllocationFailed`](crate::StatusError::AllocationFailed)
    /// if a new override cannot be stored.
    pub fn set_status(
        &mut self,
        scope: Scope,
        name: &str,
        status: Status,
    ) -> StatusResult<StatusChange> {
        validate_file_name(name)?;
        let key = self.derive_key(name);

        let Some(id) = self.find_matching(key, scope, name) else {
            if status.is_default() {
                return Ok(StatusChange::Unchanged);
            }
            self.tree.insert(
                key,
                StatusEntry {
                    scope,
                    status,
                    cert_file_name: name.to_string(),
                },
            )?;
            log::debug!("{}: inserted override {key:#010x} ({status})", self.kind);
            return Ok(StatusChange::Inserted);
        };

        let current = self.tree.value(id).map(|entry| entry.status);
        if current == Some(status) {
            return Ok(StatusChange::Unchanged);
        }
        if status.is_default() {
            self.tree.delete(id);
            log::debug!("{}: removed override {key:#010x}", self.kind);
            return Ok(StatusChange::Removed);
        }
        if let Some(entry) = self.tree.value_mut(id) {
            entry.status = status;
        }
        log::debug!("{}: updated override {key:#010x} ({status})", self.kind);
        Ok(StatusChange::Updated)
    }

    /// All overrides in key order.
    #[must_use]
    pub fn entries(&self) -> Vec<StatusEntry> {
        self.tree.iter().map(|(_, entry)| entry.clone()).collect()
    }

    /// Finds the override for `(scope, name)` stored under `key`.
    ///
    /// Starts at the topmost node carrying the derived key; every other node
    /// with that key lies below it. Subtrees that cannot hold the key are
    /// skipped, and right children are probed before left ones because equal
    /// keys are inserted to the right.
    fn find_matching(&self, key: u32, scope: Scope, name: &str) -> Option<NodeId> {
        let mut pending = vec![self.tree.find_exact(key)?];

        while let Some(id) = pending.pop() {
            let Some(node_key) = self.tree.key(id) else {
                continue;
            };
            if node_key == key
                && self
                    .tree
                    .value(id)
                    .is_some_and(|entry| entry.matches(self.kind, scope, name))
            {
                return Some(id);
            }
            if key <= node_key {
                pending.extend(self.tree.left(id));
            }
            if key >= node_key {
                pending.extend(self.tree.right(id));
            }
        }
        None
    }
}

impl std::fmt::Debug for CertStatusIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertStatusIndex")
            .field("kind", &self.kind)
            .field("len", &self.tree.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusError;
    use crate::platform::Sha256NameHasher;

    /// Sends every name to the same key.
    struct ConstantHasher;

    impl NameHasher for ConstantHasher {
        fn digest(&self, _name: &[u8]) -> [u8; 32] {
            [0x5a; 32]
        }
    }

    /// Uses the name itself as the digest, so names sharing a four-byte
    /// prefix collide.
    struct PrefixHasher;

    impl NameHasher for PrefixHasher {
        fn digest(&self, name: &[u8]) -> [u8; 32] {
            let mut out = [0u8; 32];
            let n = name.len().min(32);
            out[..n].copy_from_slice(&name[..n]);
            out
        }
    }

    fn index(kind: StoreKind) -> CertStatusIndex {
        CertStatusIndex::new(kind, Arc::new(Sha256NameHasher))
    }

    #[test]
    fn test_system_key_uses_name_prefix() {
        let index = index(StoreKind::SystemTrusted);
        assert_eq!(index.derive_key("abcd1234.0"), 0x6162_6364);
        assert_eq!(index.derive_key("ab"), 0x6162_0000);
        // high bit of the first byte is masked off
        assert_eq!(index.derive_key("\u{e9}abc"), 0x43a9_6162);
    }

    #[test]
    fn test_user_key_uses_digest_prefix() {
        let index = index(StoreKind::UserTrusted);
        // SHA-256("abc") = ba7816bf...
        assert_eq!(index.derive_key("abc"), 0xba78_16bf & KEY_MASK);
    }

    #[test]
    fn test_absent_override_is_enabled() {
        let index = index(StoreKind::UserTrusted);
        assert_eq!(
            index.get_status(Scope::user(100), "abcd1234").expect("get"),
            Status::Enabled
        );
    }

    #[test]
    fn test_set_transitions() {
        let mut index = index(StoreKind::UserTrusted);
        let scope = Scope::user(100);

        assert_eq!(
            index.set_status(scope, "cert", Status::Enabled).expect("set"),
            StatusChange::Unchanged
        );
        assert!(index.is_empty());

        assert_eq!(
            index.set_status(scope, "cert", Status::Disabled).expect("set"),
            StatusChange::Inserted
        );
        assert_eq!(
            index.set_status(scope, "cert", Status::Disabled).expect("set"),
            StatusChange::Unchanged
        );
        assert_eq!(index.len(), 1);

        assert_eq!(
            index.set_status(scope, "cert", Status::Enabled).expect("set"),
            StatusChange::Removed
        );
        assert!(index.is_empty());
        assert_eq!(index.get_status(scope, "cert").expect("get"), Status::Enabled);
    }

    #[test]
    fn test_scope_isolation_per_store() {
        let mut user = index(StoreKind::UserTrusted);
        user.set_status(Scope::user(100), "abcd1234", Status::Disabled)
            .expect("set");
        assert_eq!(
            user.get_status(Scope::user(100), "abcd1234").expect("get"),
            Status::Disabled
        );
        assert_eq!(
            user.get_status(Scope::user(200), "abcd1234").expect("get"),
            Status::Enabled
        );

        let mut app = index(StoreKind::AppPrivateCredential);
        app.set_status(Scope::new(10, 10_001), "key", Status::Disabled)
            .expect("set");
        assert_eq!(
            app.get_status(Scope::new(10, 10_002), "key").expect("get"),
            Status::Enabled
        );

        let mut system = index(StoreKind::SystemTrusted);
        system
            .set_status(Scope::user(0), "abcd1234.0", Status::Disabled)
            .expect("set");
        assert_eq!(
            system.get_status(Scope::user(999), "abcd1234.0").expect("get"),
            Status::Disabled
        );
    }

    #[test]
    fn test_system_prefix_collisions() {
        let mut index = index(StoreKind::SystemTrusted);
        let scope = Scope::default();
        assert_eq!(index.derive_key("abcd0001"), index.derive_key("abcd0002"));

        index.set_status(scope, "abcd0001", Status::Disabled).expect("set");
        index.set_status(scope, "abcd0002", Status::Disabled).expect("set");
        index.set_status(scope, "abcd0001", Status::Enabled).expect("set");

        assert_eq!(index.get_status(scope, "abcd0001").expect("get"), Status::Enabled);
        assert_eq!(index.get_status(scope, "abcd0002").expect("get"), Status::Disabled);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_forced_collisions_across_many_names() {
        let mut index = CertStatusIndex::new(StoreKind::UserTrusted, Arc::new(PrefixHasher));
        let scope = Scope::user(5);
        let names: Vec<String> = (0..40).map(|n| format!("cert-{n}")).collect();
        assert!(names.iter().all(|name| index.derive_key(name) == index.derive_key("cert")));

        for (n, name) in names.iter().enumerate() {
            index.set_status(scope, name, Status::Disabled).expect("set");
            // neighbouring keys force rotations around the colliding run
            if n % 8 == 0 {
                let below = format!("cerr-{n}");
                let above = format!("ceru-{n}");
                index.set_status(scope, &below, Status::Disabled).expect("set");
                index.set_status(scope, &above, Status::Disabled).expect("set");
            }
        }
        for name in names.iter().step_by(2) {
            index.set_status(scope, name, Status::Enabled).expect("set");
        }

        for (n, name) in names.iter().enumerate() {
            let expected = if n % 2 == 0 {
                Status::Enabled
            } else {
                Status::Disabled
            };
            assert_eq!(index.get_status(scope, name).expect("get"), expected, "{name}");
        }
        assert_eq!(index.len(), 20 + 10);
    }

    #[test]
    fn test_collision_below_a_different_key() {
        // k, k-1, k+1, k: the second `k` goes right of the first, then left
        // of `k+1`, and the recolor leaves it under a node with another key.
        let mut index = index(StoreKind::SystemTrusted);
        let scope = Scope::default();
        for name in ["abcd.0", "abcc.0", "abce.0", "abcd.1"] {
            index.set_status(scope, name, Status::Disabled).expect("set");
        }

        let key = index.derive_key("abcd.1");
        let top = index.tree.find_exact(key).expect("top");
        assert_eq!(index.tree.root(), Some(top));
        let above = index.tree.right(top).expect("right");
        assert_eq!(index.tree.key(above), Some(index.derive_key("abce.0")));
        let deep = index.tree.left(above).expect("left");
        assert_eq!(index.tree.key(deep), Some(key));
        assert_eq!(
            index.tree.value(deep).map(|entry| entry.cert_file_name.as_str()),
            Some("abcd.1")
        );

        assert_eq!(index.get_status(scope, "abcd.1").expect("get"), Status::Disabled);
        assert_eq!(
            index.set_status(scope, "abcd.1", Status::Enabled).expect("set"),
            StatusChange::Removed
        );
        assert_eq!(index.get_status(scope, "abcd.1").expect("get"), Status::Enabled);
        assert_eq!(index.get_status(scope, "abcd.0").expect("get"), Status::Disabled);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_collisions_respect_scope() {
        let mut index = CertStatusIndex::new(StoreKind::UserTrusted, Arc::new(ConstantHasher));
        index
            .set_status(Scope::user(1), "a", Status::Disabled)
            .expect("set");
        index
            .set_status(Scope::user(2), "b", Status::Disabled)
            .expect("set");

        assert_eq!(index.get_status(Scope::user(1), "b").expect("get"), Status::Enabled);
        assert_eq!(index.get_status(Scope::user(2), "a").expect("get"), Status::Enabled);
        assert_eq!(index.get_status(Scope::user(2), "b").expect("get"), Status::Disabled);
    }

    #[test]
    fn test_payload_round_trip() {
        let mut index = index(StoreKind::AppPrivateCredential);
        for n in 0..25u32 {
            index
                .set_status(Scope::new(n % 3, 10_000 + n), &format!("key-{n}"), Status::Disabled)
                .expect("set");
        }
        let payload = index.to_payload().expect("encode");
        let rebuilt = CertStatusIndex::from_payload(
            StoreKind::AppPrivateCredential,
            Arc::new(Sha256NameHasher),
            &payload,
        )
        .expect("decode");

        assert_eq!(rebuilt.entries(), index.entries());
        for n in 0..25u32 {
            let scope = Scope::new(n % 3, 10_000 + n);
            assert_eq!(
                rebuilt.get_status(scope, &format!("key-{n}")).expect("get"),
                Status::Disabled
            );
        }
    }

    #[test]
    fn test_empty_payload_is_empty_index() {
        let index = index(StoreKind::UserTrusted);
        let payload = index.to_payload().expect("encode");
        assert!(payload.is_empty());
        let rebuilt =
            CertStatusIndex::from_payload(StoreKind::UserTrusted, Arc::new(Sha256NameHasher), &[])
                .expect("decode");
        assert!(rebuilt.is_empty());
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let mut index = index(StoreKind::UserTrusted);
        let result = index.set_status(Scope::user(1), "", Status::Disabled);
        assert!(matches!(result, Err(StatusError::InvalidInput { .. })));
        let result = index.get_status(Scope::user(1), "a\0b");
        assert!(matches!(result, Err(StatusError::InvalidInput { .. })));
        assert!(index.is_empty());
    }
}

//! Domain types for certificate status overrides.

use strum::{Display, EnumIter, EnumString};

use crate::codec::ValueCodec;
use crate::error::{StatusError, StatusResult};

/// Longest accepted certificate file name, in bytes.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Fixed-size prefix of an encoded [`StatusEntry`]: `user_id | uid | status`.
const ENTRY_FIXED_SIZE: usize = 12;

/// Certificate store with its own status index and status file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum StoreKind {
    /// System-wide trusted CA certificates. Overrides are global.
    SystemTrusted,
    /// Trusted CA certificates installed by a user.
    UserTrusted,
    /// Private credentials installed by an application.
    #[strum(serialize = "app-credential")]
    AppPrivateCredential,
}

impl StoreKind {
    /// Every store kind, in slot order.
    pub const ALL: [Self; 3] = [
        Self::SystemTrusted,
        Self::UserTrusted,
        Self::AppPrivateCredential,
    ];

    /// Position of this kind in [`Self::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::SystemTrusted => 0,
            Self::UserTrusted => 1,
            Self::AppPrivateCredential => 2,
        }
    }

    /// Whether an override recorded under `recorded` applies to `requested`
    /// in this store.
    #[must_use]
    pub const fn scope_matches(self, recorded: Scope, requested: Scope) -> bool {
        match self {
            Self::SystemTrusted => true,
            Self::UserTrusted => recorded.user_id == requested.user_id,
            Self::AppPrivateCredential => {
                recorded.user_id == requested.user_id && recorded.uid == requested.uid
            }
        }
    }
}

/// Administrative status of a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Status {
    /// Default for any certificate without an override.
    #[default]
    Enabled,
    /// Administratively disabled.
    Disabled,
}

impl Status {
    /// Persisted status code.
    #[must_use]
    pub const fn to_wire(self) -> u32 {
        match self {
            Self::Enabled => 0,
            Self::Disabled => 1,
        }
    }

    /// Parses a persisted status code.
    #[must_use]
    pub const fn from_wire(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Enabled),
            1 => Some(Self::Disabled),
            _ => None,
        }
    }

    /// Returns `true` for the implicit default status.
    #[must_use]
    pub const fn is_default(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// Caller identity under which an override is recorded and matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Scope {
    /// User (profile) identifier.
    pub user_id: u32,
    /// Application identifier within the user.
    pub uid: u32,
}

impl Scope {
    /// Creates a scope.
    #[must_use]
    pub const fn new(user_id: u32, uid: u32) -> Self {
        Self { user_id, uid }
    }

    /// Scope with only a user identifier.
    #[must_use]
    pub const fn user(user_id: u32) -> Self {
        Self { user_id, uid: 0 }
    }
}

/// One recorded exception to the default status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Scope the override was recorded under.
    pub scope: Scope,
    /// Non-default status.
    pub status: Status,
    /// Certificate file name.
    pub cert_file_name: String,
}

impl StatusEntry {
    /// Whether this entry is the override for `(scope, name)` in `kind`.
    #[must_use]
    pub fn matches(&self, kind: StoreKind, scope: Scope, name: &str) -> bool {
        self.cert_file_name == name && kind.scope_matches(self.scope, scope)
    }
}

/// Checks a certificate file name before it reaches an index.
///
/// # Errors
///
/// Returns [`StatusError::InvalidInput`] for empty names, names containing
/// NUL and names longer than [`MAX_FILE_NAME_LEN`] bytes.
pub fn validate_file_name(name: &str) -> StatusResult<()> {
    if name.is_empty() {
        return Err(StatusError::invalid_input(
            "cert_file_name",
            "must not be empty",
        ));
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(StatusError::invalid_input(
            "cert_file_name",
            format!("{} bytes exceeds {MAX_FILE_NAME_LEN}", name.len()),
        ));
    }
    if name.as_bytes().contains(&0) {
        return Err(StatusError::invalid_input(
            "cert_file_name",
            "must not contain NUL",
        ));
    }
    Ok(())
}

/// Value codec for [`StatusEntry`] records.
///
/// ```text
/// user_id (u32 LE) | uid (u32 LE) | status (u32 LE) | name bytes | 0x00
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusEntryCodec;

impl ValueCodec<StatusEntry> for StatusEntryCodec {
    fn encoded_len(&self, value: &StatusEntry) -> usize {
        ENTRY_FIXED_SIZE + value.cert_file_name.len() + 1
    }

    fn encode_into(&self, value: &StatusEntry, out: &mut [u8]) -> StatusResult<usize> {
        let needed = self.encoded_len(value);
        if out.len() < needed {
            return Err(StatusError::BufferTooSmall {
                needed,
                available: out.len(),
            });
        }
        let name = value.cert_file_name.as_bytes();
        out[0..4].copy_from_slice(&value.scope.user_id.to_le_bytes());
        out[4..8].copy_from_slice(&value.scope.uid.to_le_bytes());
        out[8..12].copy_from_slice(&value.status.to_wire().to_le_bytes());
        out[ENTRY_FIXED_SIZE..ENTRY_FIXED_SIZE + name.len()].copy_from_slice(name);
        out[needed - 1] = 0;
        Ok(needed)
    }

    fn decode(&self, bytes: &[u8]) -> StatusResult<StatusEntry> {
        if bytes.len() <= ENTRY_FIXED_SIZE {
            return Err(StatusError::malformed(format!(
                "status entry of {} bytes is too short",
                bytes.len()
            )));
        }
        let user_id = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let uid = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let code = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

        let status = Status::from_wire(code)
            .ok_or_else(|| StatusError::malformed(format!("unknown status code {code}")))?;
        if status.is_default() {
            return Err(StatusError::malformed(
                "default status is never persisted",
            ));
        }

        let Some((&0, name)) = bytes[ENTRY_FIXED_SIZE..].split_last() else {
            return Err(StatusError::malformed(
                "certificate file name is not NUL-terminated",
            ));
        };
        let name = std::str::from_utf8(name)
            .map_err(|_| StatusError::malformed("certificate file name is not UTF-8"))?;
        validate_file_name(name).map_err(|err| StatusError::malformed(err.to_string()))?;

        Ok(StatusEntry {
            scope: Scope::new(user_id, uid),
            status,
            cert_file_name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    fn entry(name: &str) -> StatusEntry {
        StatusEntry {
            scope: Scope::new(10, 10_042),
            status: Status::Disabled,
            cert_file_name: name.to_string(),
        }
    }

    fn encoded(value: &StatusEntry) -> Vec<u8> {
        let mut out = vec![0u8; StatusEntryCodec.encoded_len(value)];
        let written = StatusEntryCodec.encode_into(value, &mut out).expect("encode");
        assert_eq!(written, out.len());
        out
    }

    #[test]
    fn test_store_kind_names() {
        assert_eq!(StoreKind::SystemTrusted.to_string(), "system-trusted");
        assert_eq!(StoreKind::UserTrusted.to_string(), "user-trusted");
        assert_eq!(StoreKind::AppPrivateCredential.to_string(), "app-credential");
        assert_eq!(
            StoreKind::from_str("app-credential").expect("parse"),
            StoreKind::AppPrivateCredential
        );
        assert!(StoreKind::from_str("public-credential").is_err());
    }

    #[test]
    fn test_store_kind_slots() {
        let kinds: Vec<StoreKind> = StoreKind::iter().collect();
        assert_eq!(kinds, StoreKind::ALL.to_vec());
        for (slot, kind) in StoreKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), slot);
        }
    }

    #[test]
    fn test_scope_rules() {
        let recorded = Scope::new(100, 1);
        assert!(StoreKind::SystemTrusted.scope_matches(recorded, Scope::new(7, 7)));
        assert!(StoreKind::UserTrusted.scope_matches(recorded, Scope::new(100, 2)));
        assert!(!StoreKind::UserTrusted.scope_matches(recorded, Scope::new(200, 1)));
        assert!(StoreKind::AppPrivateCredential.scope_matches(recorded, Scope::new(100, 1)));
        assert!(!StoreKind::AppPrivateCredential.scope_matches(recorded, Scope::new(100, 2)));
    }

    #[test]
    fn test_status_wire_codes() {
        assert_eq!(Status::default(), Status::Enabled);
        assert_eq!(Status::Enabled.to_wire(), 0);
        assert_eq!(Status::Disabled.to_wire(), 1);
        assert_eq!(Status::from_wire(1), Some(Status::Disabled));
        assert_eq!(Status::from_wire(2), None);
    }

    #[test]
    fn test_entry_layout() {
        let bytes = encoded(&entry("ab"));
        assert_eq!(
            bytes,
            vec![10, 0, 0, 0, 0x3a, 0x27, 0, 0, 1, 0, 0, 0, b'a', b'b', 0]
        );
        assert_eq!(StatusEntryCodec.decode(&bytes).expect("decode"), entry("ab"));
    }

    #[test]
    fn test_encode_into_short_buffer() {
        let mut out = [0u8; 4];
        let result = StatusEntryCodec.encode_into(&entry("name"), &mut out);
        assert!(matches!(
            result,
            Err(StatusError::BufferTooSmall {
                needed: 17,
                available: 4
            })
        ));
    }

    #[test]
    fn test_decode_rejects_missing_terminator() {
        let mut bytes = encoded(&entry("name"));
        bytes.pop();
        assert!(matches!(
            StatusEntryCodec.decode(&bytes),
            Err(StatusError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_decode_rejects_interior_nul_and_empty_name() {
        let mut bytes = encoded(&entry("name"));
        bytes[ENTRY_FIXED_SIZE + 1] = 0;
        assert!(StatusEntryCodec.decode(&bytes).is_err());

        let mut empty = encoded(&entry("x"));
        empty.remove(ENTRY_FIXED_SIZE);
        assert!(StatusEntryCodec.decode(&empty).is_err());
    }

    #[test]
    fn test_decode_rejects_default_and_unknown_status() {
        let mut bytes = encoded(&entry("name"));
        bytes[8] = 0;
        assert!(StatusEntryCodec.decode(&bytes).is_err());
        bytes[8] = 9;
        assert!(StatusEntryCodec.decode(&bytes).is_err());
    }

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("abcd1234.0").is_ok());
        assert!(validate_file_name(&"a".repeat(MAX_FILE_NAME_LEN)).is_ok());
        for bad in ["", "a\0b"] {
            assert!(matches!(
                validate_file_name(bad),
                Err(StatusError::InvalidInput { .. })
            ));
        }
        assert!(validate_file_name(&"a".repeat(MAX_FILE_NAME_LEN + 1)).is_err());
    }
}

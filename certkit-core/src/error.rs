//! Error types for the certificate status index.

use thiserror::Error;

/// Result type for certificate status operations.
pub type StatusResult<T> = Result<T, StatusError>;

/// Errors raised by the status index, its persistence layers and the
/// platform collaborators it drives.
///
/// A missing override is not an error: lookups return `Option` and the
/// domain layer maps absence to [`Status::Enabled`](crate::Status::Enabled).
#[derive(Debug, Error)]
pub enum StatusError {
    /// Index node storage could not be grown.
    #[error("allocation failed")]
    AllocationFailed,

    /// An encoder was handed less space than it reported needing.
    #[error("buffer too small: needed {needed} bytes, {available} available")]
    BufferTooSmall {
        /// Bytes the encoder needs.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// Serialized data would exceed the fixed size ceiling.
    #[error("encoded size {size} exceeds limit of {limit} bytes")]
    TooLarge {
        /// Size that was requested or encountered.
        size: usize,
        /// Configured ceiling.
        limit: usize,
    },

    /// A persisted record could not be parsed.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The integrity envelope failed verification.
    #[error("integrity check failed: {0}")]
    IntegrityMismatch(String),

    /// The status file carries a format version this build cannot read.
    #[error("unsupported status file version: {0}")]
    UnsupportedVersion(u32),

    /// Invalid input parameter.
    #[error("invalid input '{parameter}': {reason}")]
    InvalidInput {
        /// Name of the invalid parameter.
        parameter: &'static str,
        /// Description of the issue.
        reason: String,
    },

    /// An I/O operation on a status file failed.
    #[error("I/O error during {context}: {source}")]
    Io {
        /// Operation that failed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Errors coming from the device keystore.
    #[error("keystore error: {0}")]
    Keystore(String),

    /// Errors coming from the blob store.
    #[error("blob store error: {0}")]
    BlobStore(String),

    /// Cryptographic failures (HMAC, HKDF, RNG).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// A store lock was poisoned by a panicking holder.
    #[error("status lock error: {0}")]
    Lock(String),

    /// Serialization/deserialization failures of key envelopes.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unsupported MAC key envelope version.
    #[error("unsupported envelope version: {0}")]
    UnsupportedEnvelopeVersion(u32),
}

impl StatusError {
    /// Creates an I/O error with context.
    pub fn io<S: Into<String>>(context: S, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a malformed record error.
    pub fn malformed<S: Into<String>>(context: S) -> Self {
        Self::MalformedRecord(context.into())
    }

    /// Creates an invalid input error.
    pub fn invalid_input<R: Into<String>>(parameter: &'static str, reason: R) -> Self {
        Self::InvalidInput {
            parameter,
            reason: reason.into(),
        }
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        Self::Lock(format!("{what} lock poisoned"))
    }

    /// Returns `true` when the error means a persisted status file cannot be
    /// trusted: bad MAC, unknown version, or unparseable records.
    #[must_use]
    pub const fn is_untrusted_data(&self) -> bool {
        matches!(
            self,
            Self::IntegrityMismatch(_) | Self::UnsupportedVersion(_) | Self::MalformedRecord(_)
        )
    }
}

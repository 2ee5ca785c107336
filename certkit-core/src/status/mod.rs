//! Certificate status overrides: domain types, per-store index and the
//! service tying the three stores to their status files.

mod cert_index;
mod service;
mod types;

pub use cert_index::{CertStatusIndex, StatusChange};
pub use service::StatusService;
pub use types::{
    validate_file_name, Scope, Status, StatusEntry, StatusEntryCodec, StoreKind,
    MAX_FILE_NAME_LEN,
};

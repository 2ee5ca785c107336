//! Platform abstraction traits for the certificate status index.
//!
//! The status index is platform-agnostic. Everything it needs from the host
//! is expressed as a trait:
//!
//! - [`StatusFileStore`]: Whole-file read/rewrite of the per-store status files
//! - [`IntegrityKeystore`]: Keyed MAC and randomness for the integrity envelope
//! - [`NameHasher`]: Digest used to derive index keys from file names
//! - [`DeviceKeystore`]: Hardware-backed sealing of the MAC key
//! - [`AtomicBlobStore`]: Atomic storage for the sealed MAC key envelope
//!
//! # Provided Implementations
//!
//! - [`FsStatusFileStore`]: status files on the local filesystem
//! - [`Sha256NameHasher`]: SHA-256 name digests
//! - [`memory`]: in-memory implementations of every trait, for tests

mod blob_store;
mod file_store;
mod fs;
mod hasher;
mod keystore;
pub mod memory;

pub use blob_store::AtomicBlobStore;
pub use file_store::StatusFileStore;
pub use fs::FsStatusFileStore;
pub use hasher::{NameHasher, Sha256NameHasher};
pub use keystore::{DeviceKeystore, IntegrityKeystore};

// Re-export memory implementations for testing
pub use memory::MemoryPlatform;

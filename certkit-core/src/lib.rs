//! Certificate status index.
//!
//! Tracks, per certificate store, which certificates are administratively
//! disabled. Only overrides of the default ([`Status::Enabled`]) are kept.
//! Each store's overrides live in a red-black tree in memory and in one
//! integrity-protected status file on disk; a file that fails verification
//! stops the service from starting.
//!
//! Start with [`StatusService`].
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod codec;
pub mod envelope;
pub mod index;
pub mod keys;
pub mod logger;
pub mod paths;
pub mod platform;

mod error;
pub use error::*;

mod status;
pub use status::*;

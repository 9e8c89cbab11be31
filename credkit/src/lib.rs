//! CredKit links everything a host application needs into one library.
//!
//! All functionality lives in [`credkit_core`], which also carries the UniFFI
//! scaffolding. Rust hosts depend on this crate instead of the core.

pub use credkit_core::*;

/// Result type of the caller-facing request operations.
pub type CredKitResult<T, E = CredentialRequestError> = std::result::Result<T, E>;

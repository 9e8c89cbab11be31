//! `credkit-core` decides which platform backend serves a WebAuthn credential request and
//! joins what the backends report into a single result.
//!
//! The host application implements the backend adapters in [`backend`] and hands them to a
//! [`CredentialRequestOrchestrator`]. Everything else, the [`ArbitrationPolicy`] and the
//! [`CompletionBarrier`] in particular, is pure Rust and usable on its own.

#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod backend;

mod barrier;
pub use barrier::*;

mod capability;
pub use capability::*;

mod config;
pub use config::*;

mod error;
pub use error::*;

/// Forwarding of log records to the host application.
pub mod logger;

mod orchestrator;
pub use orchestrator::CredentialRequestOrchestrator;

mod policy;
pub use policy::*;

mod request;
pub use request::*;

uniffi::setup_scaffolding!("credkit_core");

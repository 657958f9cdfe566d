//! Credential storage backends.
//!
//! Federated credentials live for the process lifetime only; a restart forces
//! a new login.

pub mod memory;

pub use memory::InMemoryCredentialStore;

//! Core types and traits for the wifassist workspace.
//!
//! This crate defines the shared abstractions used by the federation broker
//! and the streaming assistant client: the error taxonomy, the credential
//! data model, the StreamAssist wire shapes, and the async traits each layer
//! implements.

pub mod assist;
pub mod auth;
pub mod error;
pub mod token;
pub mod traits;

pub use assist::{
    AssistChunk, AssistEvent, FinalAnswer, ToolDeclaration, ToolExtraction, ToolInvocation,
};
pub use auth::{AuthDescriptor, CacheKey, FederationTarget};
pub use error::{ExchangeStep, WifError};
pub use token::{BearerToken, FederatedCredential, ProviderToken};
pub use traits::{AssistTransport, ChunkStream, CredentialStore, StreamAssistRequest};

//! Async traits shared across all wifassist crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `wifassist-types`, not on each other.

use crate::{AssistChunk, BearerToken, CacheKey, FederatedCredential, WifError};
use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, WifError>;

/// A pinned, sendable stream of decoded StreamAssist frames, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<AssistChunk>> + Send>>;

/// Process-wide store of federated credentials, keyed by [`CacheKey`].
///
/// Implementations must be safe to call concurrently; writes to one key are
/// last-write-wins.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the credential cached under `key`.
    async fn get(&self, key: &CacheKey) -> Result<Option<FederatedCredential>>;
    /// Store (or overwrite) the credential under `key`.
    async fn put(&self, key: &CacheKey, credential: &FederatedCredential) -> Result<()>;
    /// Drop the credential under `key`, if any.
    async fn remove(&self, key: &CacheKey) -> Result<()>;
}

/// One outbound call to the assistant service.
#[derive(Debug, Clone, Default)]
pub struct StreamAssistRequest {
    /// Query text, including any injected tool instructions.
    pub query: String,
    /// Sticky session name from a previous call in the same conversation.
    pub session: Option<String>,
    /// Bearer credential injected by the broker.
    pub credential: Option<BearerToken>,
}

/// Issues one StreamAssist call and yields its frames.
#[async_trait]
pub trait AssistTransport: Send + Sync {
    /// Send the request and return the response frames as they arrive.
    async fn stream_assist(&self, request: StreamAssistRequest) -> Result<ChunkStream>;
}

//! In-memory credential store backed by a `HashMap` behind a `Mutex`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use wifassist_types::{CacheKey, CredentialStore, FederatedCredential, traits::Result};

/// A volatile [`CredentialStore`] keyed by `(app, user, credential_key)`.
///
/// The map is only reachable through the trait, so callers cannot mutate the
/// storage behind the store's back.
pub struct InMemoryCredentialStore {
    data: Mutex<HashMap<CacheKey, FederatedCredential>>,
}

impl InMemoryCredentialStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Entries are plain values, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, FederatedCredential>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<FederatedCredential>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn put(&self, key: &CacheKey, credential: &FederatedCredential) -> Result<()> {
        let replaced = self.lock().insert(key.clone(), credential.clone()).is_some();
        tracing::debug!(%key, replaced, "federated credential cached");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

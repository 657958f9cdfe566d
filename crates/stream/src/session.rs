use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Sticky conversation id assigned by the assistant service.
///
/// Cloning yields another handle to the same id, so a live response stream
/// can record the id while the caller keeps its own handle. The id survives
/// across invocations until [`reset`](Self::reset).
#[derive(Debug, Clone, Default)]
pub struct StreamSession {
    id: Arc<Mutex<Option<String>>>,
}

impl StreamSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume an existing conversation.
    pub fn with_id(id: impl Into<String>) -> Self {
        let session = Self::new();
        session.set(id);
        session
    }

    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.lock().clone()
    }

    pub fn set(&self, id: impl Into<String>) {
        let id = id.into();
        let mut slot = self.lock();
        if slot.as_deref() != Some(id.as_str()) {
            tracing::debug!(session = %id, "session id assigned");
            *slot = Some(id);
        }
    }

    /// Forget the id; the next call starts a new conversation.
    pub fn reset(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.id.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

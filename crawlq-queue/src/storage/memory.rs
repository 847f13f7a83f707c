//! In-memory checkpoint storage, mostly useful for tests and short-lived
//! crawls that only want the persistence hooks.
use async_trait::async_trait;
use std::sync::Mutex;

use crate::{QueueError, Storage};

pub struct InMemoryStorage<P> {
    snapshot: Mutex<Option<Vec<P>>>,
}

impl<P> InMemoryStorage<P> {
    pub fn new() -> Self {
        Self {
            snapshot: Mutex::new(None),
        }
    }

    /// Storage that already holds a snapshot, as if a previous run wrote it.
    pub fn with_payloads(payloads: Vec<P>) -> Self {
        Self {
            snapshot: Mutex::new(Some(payloads)),
        }
    }

    /// Whether a snapshot is currently stored.
    pub fn exists(&self) -> Result<bool, QueueError> {
        let snapshot = self
            .snapshot
            .lock()
            .map_err(|e| QueueError::Storage(e.to_string()))?;
        Ok(snapshot.is_some())
    }
}

impl<P: Clone> InMemoryStorage<P> {
    pub fn snapshot(&self) -> Result<Option<Vec<P>>, QueueError> {
        let snapshot = self
            .snapshot
            .lock()
            .map_err(|e| QueueError::Storage(e.to_string()))?;
        Ok(snapshot.clone())
    }
}

impl<P> Default for InMemoryStorage<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<P> Storage<P> for InMemoryStorage<P>
where
    P: Clone + Send + Sync + 'static,
{
    async fn read(&self) -> Result<Vec<P>, QueueError> {
        Ok(self.snapshot()?.unwrap_or_default())
    }

    async fn write(&self, payloads: &[P]) -> Result<(), QueueError> {
        let mut snapshot = self
            .snapshot
            .lock()
            .map_err(|e| QueueError::Storage(e.to_string()))?;
        *snapshot = Some(payloads.to_vec());
        Ok(())
    }

    async fn clear(&self) -> Result<(), QueueError> {
        let mut snapshot = self
            .snapshot
            .lock()
            .map_err(|e| QueueError::Storage(e.to_string()))?;
        *snapshot = None;
        Ok(())
    }
}

impl<P> std::fmt::Debug for InMemoryStorage<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stored = match self.snapshot.lock() {
            Ok(snapshot) => snapshot.as_ref().map(Vec::len),
            Err(_) => None,
        };
        f.debug_struct("InMemoryStorage")
            .field("stored", &stored)
            .finish()
    }
}

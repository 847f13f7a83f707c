//! Checkpoint storage for the backlog.
//!
//! Storage is best effort: the persistence wrapper writes snapshots of the
//! undispatched items on an interval and clears them once the queue drains.
//! Items that are in flight at snapshot time are not captured.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::InMemoryStorage;

use async_trait::async_trait;
use std::sync::Arc;

use crate::{Queue, QueueError};

#[async_trait]
pub trait Storage<P>: Send + Sync
where
    P: Send + Sync + 'static,
{
    /// Previously written payloads, or an empty list if nothing was written.
    async fn read(&self) -> Result<Vec<P>, QueueError>;
    /// Replace the stored snapshot, creating the location when needed.
    async fn write(&self, payloads: &[P]) -> Result<(), QueueError>;
    /// Drop the snapshot. Succeeds when there is nothing to clear.
    async fn clear(&self) -> Result<(), QueueError>;
}

pub type AbstractStorage<P> = Arc<dyn Storage<P>>;

#[async_trait]
impl<P, S> Storage<P> for Arc<S>
where
    P: Send + Sync + 'static,
    S: Storage<P> + ?Sized,
{
    async fn read(&self) -> Result<Vec<P>, QueueError> {
        (**self).read().await
    }

    async fn write(&self, payloads: &[P]) -> Result<(), QueueError> {
        (**self).write(payloads).await
    }

    async fn clear(&self) -> Result<(), QueueError> {
        (**self).clear().await
    }
}

/// Write the current backlog of `queue` to `storage`.
pub async fn persist_payloads<P, S>(storage: &S, queue: &Queue<P>) -> Result<(), QueueError>
where
    P: Clone + Send + Sync + 'static,
    S: Storage<P> + ?Sized,
{
    storage.write(&queue.get_queue()).await
}

pub async fn load_payloads<P, S>(storage: &S) -> Result<Vec<P>, QueueError>
where
    P: Send + Sync + 'static,
    S: Storage<P> + ?Sized,
{
    storage.read().await
}

/// Stored payloads if a non-empty snapshot exists, `initial` otherwise.
pub async fn load_payloads_or<P, S>(storage: &S, initial: Vec<P>) -> Result<Vec<P>, QueueError>
where
    P: Send + Sync + 'static,
    S: Storage<P> + ?Sized,
{
    let payloads = load_payloads(storage).await?;
    if payloads.is_empty() {
        return Ok(initial);
    }
    Ok(payloads)
}

pub async fn clear_payloads<P, S>(storage: &S) -> Result<(), QueueError>
where
    P: Send + Sync + 'static,
    S: Storage<P> + ?Sized,
{
    storage.clear().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_or_falls_back_to_initial_payloads() {
        let storage = InMemoryStorage::<u32>::new();
        let payloads = load_payloads_or(&storage, vec![1, 2]).await.unwrap();
        assert_eq!(payloads, vec![1, 2]);

        storage.write(&[]).await.unwrap();
        let payloads = load_payloads_or(&storage, vec![3]).await.unwrap();
        assert_eq!(payloads, vec![3]);
    }

    #[tokio::test]
    async fn load_or_prefers_snapshot() {
        let storage = InMemoryStorage::with_payloads(vec![9, 8]);
        let payloads = load_payloads_or(&storage, vec![1]).await.unwrap();
        assert_eq!(payloads, vec![9, 8]);
    }

    #[tokio::test]
    async fn persist_writes_backlog_snapshot() {
        let queue = Queue::default();
        queue.enqueue("a".to_string());
        queue.enqueue("b".to_string());

        let storage: AbstractStorage<String> = Arc::new(InMemoryStorage::new());
        persist_payloads(storage.as_ref(), &queue).await.unwrap();
        let stored = load_payloads::<String, _>(&storage).await.unwrap();
        assert_eq!(stored, vec!["a", "b"]);

        clear_payloads::<String, _>(&storage).await.unwrap();
        assert!(load_payloads::<String, _>(&storage).await.unwrap().is_empty());
    }
}

//! Checkpointing of the backlog.
//!
//! While the queue is busy the undispatched payloads are written to storage on
//! an interval. When the queue completes the checkpoint is cleared. Restoring
//! happens in the runner, before the subscriber is registered.

use async_trait::async_trait;
use crawlq_queue::{
    clear_payloads, persist_payloads, AbstractStorage, BoxError, Layer, Queue, Subscriber,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::ticker::Ticker;

pub const DEFAULT_PERSISTENCE_INTERVAL: Duration = crawlq_config::DEFAULT_PERSISTENCE_INTERVAL;

pub struct PersistenceConfig<P>
where
    P: Send + Sync + 'static,
{
    pub storage: AbstractStorage<P>,
    /// Seeds the queue when storage holds no checkpoint.
    pub initial_payloads: Vec<P>,
    pub interval: Duration,
}

impl<P> PersistenceConfig<P>
where
    P: Send + Sync + 'static,
{
    pub fn new(storage: AbstractStorage<P>) -> Self {
        Self {
            storage,
            initial_payloads: Vec::new(),
            interval: DEFAULT_PERSISTENCE_INTERVAL,
        }
    }

    pub fn with_initial_payloads(mut self, payloads: Vec<P>) -> Self {
        self.initial_payloads = payloads;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl<P> Clone for PersistenceConfig<P>
where
    P: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            initial_payloads: self.initial_payloads.clone(),
            interval: self.interval,
        }
    }
}

impl<P> std::fmt::Debug for PersistenceConfig<P>
where
    P: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceConfig")
            .field("initial_payloads", &self.initial_payloads.len())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

pub struct PersistenceLayer<P>
where
    P: Send + Sync + 'static,
{
    storage: AbstractStorage<P>,
    queue: Queue<P>,
    interval: Duration,
}

impl<P> PersistenceLayer<P>
where
    P: Send + Sync + 'static,
{
    pub fn new(storage: AbstractStorage<P>, queue: Queue<P>, interval: Duration) -> Self {
        Self {
            storage,
            queue,
            interval,
        }
    }
}

impl<S, P> Layer<S> for PersistenceLayer<P>
where
    P: Send + Sync + 'static,
{
    type Service = Persistence<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        Persistence {
            inner,
            storage: Arc::clone(&self.storage),
            queue: self.queue.clone(),
            ticker: Ticker::new(self.interval),
        }
    }
}

pub struct Persistence<S, P>
where
    P: Send + Sync + 'static,
{
    inner: S,
    storage: AbstractStorage<P>,
    queue: Queue<P>,
    ticker: Ticker,
}

impl<S, P> Persistence<S, P>
where
    P: Clone + Send + Sync + 'static,
{
    fn start_checkpointing(&self) {
        let storage = Arc::clone(&self.storage);
        let queue = self.queue.clone();

        self.ticker.start(move || {
            let storage = Arc::clone(&storage);
            let queue = queue.clone();
            async move {
                match persist_payloads(storage.as_ref(), &queue).await {
                    Ok(()) => debug!(items = queue.len(), "checkpoint saved"),
                    Err(e) => warn!(error = %e, "failed to save checkpoint"),
                }
            }
        });
    }
}

#[async_trait]
impl<T, P, S> Subscriber<T, P> for Persistence<S, P>
where
    T: Send + 'static,
    P: Clone + Send + Sync + 'static,
    S: Subscriber<T, P>,
{
    async fn next(&self, payload: T) -> Result<(), BoxError> {
        self.start_checkpointing();
        self.inner.next(payload).await
    }

    fn error(&self, error: BoxError, payload: &P) {
        self.start_checkpointing();
        self.inner.error(error, payload)
    }

    async fn complete(&self) {
        self.ticker.stop().await;
        if let Err(e) = clear_payloads(self.storage.as_ref()).await {
            warn!(error = %e, "failed to clear checkpoint");
        }
        self.inner.complete().await
    }
}

impl<S, P> std::fmt::Debug for Persistence<S, P>
where
    P: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("queue", &self.queue)
            .field("ticker", &self.ticker)
            .finish_non_exhaustive()
    }
}

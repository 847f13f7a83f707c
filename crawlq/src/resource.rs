//! Per-item resources backed by one shared resource.
//!
//! The typical case is a browser automation session: one browser is launched
//! lazily on the first item, every item gets its own page, the page is closed
//! once the item settles and the browser is shut down when the queue
//! completes.

use async_trait::async_trait;
use crawlq_queue::{BoxError, Layer, Subscriber};
use futures::FutureExt;
use std::{ops::Deref, panic::AssertUnwindSafe, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Lifecycle of the shared resource and the per-item resources taken from it.
#[async_trait]
pub trait ResourceProvider: Send + Sync + 'static {
    /// The resource launched once and shared by all items.
    type Shared: Send + Sync + 'static;
    /// The resource handed to a single item. The handler receives a clone,
    /// the original is passed to [`ResourceProvider::release`].
    type Resource: Clone + Send + Sync + 'static;

    async fn launch(&self) -> Result<Self::Shared, BoxError>;

    async fn acquire(&self, shared: &Self::Shared) -> Result<Self::Resource, BoxError>;

    async fn release(&self, resource: Self::Resource);

    async fn shutdown(&self, shared: &Self::Shared);
}

#[async_trait]
impl<R> ResourceProvider for Arc<R>
where
    R: ResourceProvider,
{
    type Shared = R::Shared;
    type Resource = R::Resource;

    async fn launch(&self) -> Result<Self::Shared, BoxError> {
        (**self).launch().await
    }

    async fn acquire(&self, shared: &Self::Shared) -> Result<Self::Resource, BoxError> {
        (**self).acquire(shared).await
    }

    async fn release(&self, resource: Self::Resource) {
        (**self).release(resource).await
    }

    async fn shutdown(&self, shared: &Self::Shared) {
        (**self).shutdown(shared).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStage {
    Launch,
    Acquire,
}

impl std::fmt::Display for ResourceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStage::Launch => write!(f, "launch"),
            ResourceStage::Acquire => write!(f, "acquire"),
        }
    }
}

/// The item could not be given a resource. Only the current `next` call fails.
#[derive(Error, Debug)]
#[error("resource {stage} failed: {source}")]
pub struct ResourceInitError {
    pub stage: ResourceStage,
    #[source]
    pub source: BoxError,
}

/// Payload as the handler sees it: the persisted payload plus the resource.
/// Only `payload` is ever written back to the queue.
#[derive(Debug, Clone)]
pub struct WithResource<P, R> {
    pub payload: P,
    pub resource: R,
}

impl<P, R> Deref for WithResource<P, R> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.payload
    }
}

pub struct ResourceLayer<R> {
    provider: Arc<R>,
}

impl<R> ResourceLayer<R>
where
    R: ResourceProvider,
{
    pub fn new(provider: R) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }
}

impl<S, R> Layer<S> for ResourceLayer<R>
where
    R: ResourceProvider,
{
    type Service = ResourceScoped<S, R>;

    fn layer(&self, inner: S) -> Self::Service {
        ResourceScoped {
            inner,
            provider: Arc::clone(&self.provider),
            shared: Mutex::new(None),
        }
    }
}

pub struct ResourceScoped<S, R>
where
    R: ResourceProvider,
{
    inner: S,
    provider: Arc<R>,
    // held across `launch`, so concurrent items wait for a single launch
    shared: Mutex<Option<Arc<R::Shared>>>,
}

impl<S, R> ResourceScoped<S, R>
where
    R: ResourceProvider,
{
    async fn shared(&self) -> Result<Arc<R::Shared>, ResourceInitError> {
        let mut slot = self.shared.lock().await;
        if let Some(shared) = slot.as_ref() {
            return Ok(Arc::clone(shared));
        }

        let launched = self
            .provider
            .launch()
            .await
            .map_err(|source| ResourceInitError {
                stage: ResourceStage::Launch,
                source,
            })?;
        info!("shared resource launched");

        let shared = Arc::new(launched);
        *slot = Some(Arc::clone(&shared));
        Ok(shared)
    }

    /// Whether the shared resource is currently launched.
    pub async fn is_launched(&self) -> bool {
        self.shared.lock().await.is_some()
    }
}

#[async_trait]
impl<P, S, R> Subscriber<P, P> for ResourceScoped<S, R>
where
    P: Send + Sync + 'static,
    R: ResourceProvider,
    S: Subscriber<WithResource<P, R::Resource>, P>,
{
    async fn next(&self, payload: P) -> Result<(), BoxError> {
        let shared = self.shared().await?;
        let resource = self
            .provider
            .acquire(&shared)
            .await
            .map_err(|source| ResourceInitError {
                stage: ResourceStage::Acquire,
                source,
            })?;
        drop(shared);

        let enriched = WithResource {
            payload,
            resource: resource.clone(),
        };
        let outcome = AssertUnwindSafe(self.inner.next(enriched))
            .catch_unwind()
            .await;

        self.provider.release(resource).await;
        debug!("item resource released");

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    fn error(&self, error: BoxError, payload: &P) {
        self.inner.error(error, payload)
    }

    async fn complete(&self) {
        let shared = self.shared.lock().await.take();
        match shared {
            Some(shared) => {
                self.provider.shutdown(&shared).await;
                info!("shared resource shut down");
            }
            None => warn!("queue completed before the shared resource was launched"),
        }
        self.inner.complete().await
    }
}

impl<S, R> std::fmt::Debug for ResourceScoped<S, R>
where
    R: ResourceProvider,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceScoped")
            .field("provider", &std::any::type_name::<R>())
            .finish_non_exhaustive()
    }
}

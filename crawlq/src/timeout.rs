//! Upper bound on how long `next` may take.
//!
//! The inner `next` runs on its own task. When the limit is reached the
//! wrapper fails with [`ProcessingTimeout`] and stops waiting, but the inner
//! call keeps running to its end and its outcome is dropped.

use async_trait::async_trait;
use crawlq_queue::{BoxError, Layer, Subscriber};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("processing timed out after {limit:?}")]
pub struct ProcessingTimeout {
    pub limit: Duration,
}

/// Whether a handler error was raised by [`MaxProcessingTime`].
pub fn is_timeout_error(error: &BoxError) -> bool {
    error.downcast_ref::<ProcessingTimeout>().is_some()
}

#[derive(Debug, Clone, Copy)]
pub struct MaxProcessingTimeLayer {
    limit: Duration,
}

impl MaxProcessingTimeLayer {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

impl<S> Layer<S> for MaxProcessingTimeLayer {
    type Service = MaxProcessingTime<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MaxProcessingTime {
            inner: Arc::new(inner),
            limit: self.limit,
        }
    }
}

#[derive(Debug)]
pub struct MaxProcessingTime<S> {
    inner: Arc<S>,
    limit: Duration,
}

#[async_trait]
impl<T, P, S> Subscriber<T, P> for MaxProcessingTime<S>
where
    T: Send + 'static,
    P: Sync + 'static,
    S: Subscriber<T, P> + 'static,
{
    async fn next(&self, payload: T) -> Result<(), BoxError> {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.next(payload).await });

        match tokio::time::timeout(self.limit, handle).await {
            Ok(Ok(outcome)) => outcome,
            // the engine turns a re-raised panic into `HandlerPanicked`
            Ok(Err(join_error)) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Ok(Err(join_error)) => Err(join_error.into()),
            Err(_elapsed) => {
                warn!(limit = ?self.limit, "processing timed out");
                Err(ProcessingTimeout { limit: self.limit }.into())
            }
        }
    }

    fn error(&self, error: BoxError, payload: &P) {
        self.inner.error(error, payload)
    }

    async fn complete(&self) {
        self.inner.complete().await
    }
}

//! Retry with requeue.
//!
//! A failed payload goes back to the end of the backlog with its attempt
//! counter bumped, and travels through the whole subscriber stack again.
//! Once the counter reaches the limit the failure is forwarded to the
//! wrapped subscriber as terminal.

use async_trait::async_trait;
use crawlq_queue::{Attempt, BoxError, Layer, Queue, Subscriber};
use tracing::{error, warn};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 1;

pub struct RetryLayer<P>
where
    P: Send + Sync + 'static,
{
    queue: Queue<P>,
    retry_attempts: u32,
}

impl<P> RetryLayer<P>
where
    P: Send + Sync + 'static,
{
    /// `queue` is where failed payloads are requeued, normally the queue the
    /// wrapped subscriber ends up registered on.
    pub fn new(queue: Queue<P>, retry_attempts: u32) -> Self {
        Self {
            queue,
            retry_attempts,
        }
    }
}

impl<S, P> Layer<S> for RetryLayer<P>
where
    P: Send + Sync + 'static,
{
    type Service = Retry<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        Retry {
            inner,
            queue: self.queue.clone(),
            retry_attempts: self.retry_attempts,
        }
    }
}

pub struct Retry<S, P>
where
    P: Send + Sync + 'static,
{
    inner: S,
    queue: Queue<P>,
    retry_attempts: u32,
}

#[async_trait]
impl<T, P, S> Subscriber<T, P> for Retry<S, P>
where
    T: Send + 'static,
    P: Attempt + Clone + Send + Sync + 'static,
    S: Subscriber<T, P>,
{
    async fn next(&self, payload: T) -> Result<(), BoxError> {
        self.inner.next(payload).await
    }

    fn error(&self, err: BoxError, payload: &P) {
        let attempt = payload.attempt();
        if attempt < self.retry_attempts {
            warn!(
                attempt,
                retry_attempts = self.retry_attempts,
                error = %err,
                "requeueing failed payload"
            );
            self.queue.enqueue(payload.with_attempt(attempt + 1));
            return;
        }
        error!(attempt, error = %err, "retry attempts exhausted");
        self.inner.error(err, payload)
    }

    async fn complete(&self) {
        self.inner.complete().await
    }
}

impl<S, P> std::fmt::Debug for Retry<S, P>
where
    P: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retry")
            .field("retry_attempts", &self.retry_attempts)
            .field("queue", &self.queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlq_queue::{Attempted, PartialSubscriber};
    use std::sync::{Arc, Mutex};

    type Url = Attempted<String>;

    fn recording(errors: Arc<Mutex<Vec<u32>>>) -> PartialSubscriber<Url> {
        PartialSubscriber::new().on_error(move |_: BoxError, payload: &Url| {
            errors.lock().unwrap().push(payload.attempt);
        })
    }

    #[test]
    fn failure_below_limit_is_requeued() {
        let queue = Queue::<Url>::default();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let subscriber = RetryLayer::new(queue.clone(), 2).layer(recording(errors.clone()));

        let payload = Attempted::new("https://example.com".to_string());
        Subscriber::<Url>::error(&subscriber, "timeout".into(), &payload);

        assert_eq!(queue.get_queue(), vec![payload.with_attempt(1)]);
        assert!(errors.lock().unwrap().is_empty());
    }

    #[test]
    fn failure_at_limit_is_forwarded() {
        let queue = Queue::<Url>::default();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let subscriber = RetryLayer::new(queue.clone(), 2).layer(recording(errors.clone()));

        let payload = Attempted::new("https://example.com".to_string()).with_attempt(2);
        Subscriber::<Url>::error(&subscriber, "timeout".into(), &payload);

        assert!(queue.is_empty());
        assert_eq!(*errors.lock().unwrap(), vec![2]);
    }

    #[test]
    fn zero_attempts_never_requeues() {
        let queue = Queue::<Url>::default();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let subscriber = RetryLayer::new(queue.clone(), 0).layer(recording(errors.clone()));

        Subscriber::<Url>::error(&subscriber, "boom".into(), &Attempted::new("x".to_string()));

        assert!(queue.is_empty());
        assert_eq!(*errors.lock().unwrap(), vec![0]);
    }
}

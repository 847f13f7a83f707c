//! Lower bound on how long `next` takes. Used to throttle crawlers so a
//! fast response does not turn into a burst of requests.

use async_trait::async_trait;
use crawlq_queue::{BoxError, Layer, Subscriber};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct MinProcessingTimeLayer {
    floor: Duration,
}

impl MinProcessingTimeLayer {
    pub fn new(floor: Duration) -> Self {
        Self { floor }
    }
}

impl<S> Layer<S> for MinProcessingTimeLayer {
    type Service = MinProcessingTime<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MinProcessingTime {
            inner,
            floor: self.floor,
        }
    }
}

#[derive(Debug)]
pub struct MinProcessingTime<S> {
    inner: S,
    floor: Duration,
}

#[async_trait]
impl<T, P, S> Subscriber<T, P> for MinProcessingTime<S>
where
    T: Send + 'static,
    P: Sync + 'static,
    S: Subscriber<T, P>,
{
    /// Resolves or fails with the inner outcome, never before the floor.
    async fn next(&self, payload: T) -> Result<(), BoxError> {
        let (outcome, ()) = tokio::join!(
            self.inner.next(payload),
            tokio::time::sleep(self.floor)
        );
        outcome
    }

    fn error(&self, error: BoxError, payload: &P) {
        self.inner.error(error, payload)
    }

    async fn complete(&self) {
        self.inner.complete().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlq_queue::{PartialSubscriber, SharedSubscriber};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn taking(work: Duration, fail: bool) -> PartialSubscriber<u32> {
        PartialSubscriber::new().on_next(move |_: u32| async move {
            tokio::time::sleep(work).await;
            if fail {
                return Err::<(), BoxError>("boom".into());
            }
            Ok(())
        })
    }

    fn wrapped(floor: Duration, work: Duration, fail: bool) -> SharedSubscriber<u32> {
        Arc::new(MinProcessingTimeLayer::new(floor).layer(taking(work, fail)))
    }

    #[tokio::test(start_paused = true)]
    async fn fast_handler_is_stretched_to_floor() {
        let subscriber = wrapped(Duration::from_millis(300), Duration::from_millis(100), false);

        let started = Instant::now();
        subscriber.next(1).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_is_not_delayed_further() {
        let subscriber = wrapped(Duration::from_millis(100), Duration::from_millis(400), false);

        let started = Instant::now();
        subscriber.next(1).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_millis(450));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_waits_for_floor() {
        let subscriber = wrapped(Duration::from_millis(300), Duration::from_millis(10), true);

        let started = Instant::now();
        let error = subscriber.next(1).await.unwrap_err();
        assert_eq!(error.to_string(), "boom");
        assert!(started.elapsed() >= Duration::from_millis(300));
    }
}

//! The three-operation contract shared by handlers and every wrapper layered
//! on top of them.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::{future::Future, sync::Arc};

use crate::BoxError;

/// A consumer of queue payloads.
///
/// `T` is the payload shape `next` receives after every wrapper in front of
/// it has enriched it, `P` is the persisted shape that lives in the backlog
/// and that `error` reports against.
///
/// Every operation has a no-op default so partial handlers can be written by
/// implementing only what they care about.
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use crawlq_queue::{BoxError, Subscriber};
///
/// struct Printer;
///
/// #[async_trait]
/// impl Subscriber<String> for Printer {
///     async fn next(&self, payload: String) -> Result<(), BoxError> {
///         println!("{payload}");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Subscriber<T, P = T>: Send + Sync
where
    T: Send + 'static,
    P: Sync + 'static,
{
    /// Process one payload. A returned error is routed to [`Subscriber::error`]
    /// of the same subscriber together with the persisted payload.
    async fn next(&self, payload: T) -> Result<(), BoxError> {
        let _ = payload;
        Ok(())
    }

    /// Failure notification. Fire and forget.
    fn error(&self, error: BoxError, payload: &P) {
        let _ = (error, payload);
    }

    /// Called once per registration after the queue drained.
    async fn complete(&self) {}
}

pub type SharedSubscriber<T, P = T> = Arc<dyn Subscriber<T, P>>;

#[async_trait]
impl<T, P, S> Subscriber<T, P> for Arc<S>
where
    T: Send + 'static,
    P: Sync + 'static,
    S: Subscriber<T, P> + ?Sized,
{
    async fn next(&self, payload: T) -> Result<(), BoxError> {
        (**self).next(payload).await
    }

    fn error(&self, error: BoxError, payload: &P) {
        (**self).error(error, payload)
    }

    async fn complete(&self) {
        (**self).complete().await
    }
}

#[async_trait]
impl<T, P, S> Subscriber<T, P> for Box<S>
where
    T: Send + 'static,
    P: Sync + 'static,
    S: Subscriber<T, P> + ?Sized,
{
    async fn next(&self, payload: T) -> Result<(), BoxError> {
        (**self).next(payload).await
    }

    fn error(&self, error: BoxError, payload: &P) {
        (**self).error(error, payload)
    }

    async fn complete(&self) {
        (**self).complete().await
    }
}

type NextFn<T> =
    Box<dyn Fn(T) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;
type ErrorFn<P> = Box<dyn Fn(BoxError, &P) + Send + Sync>;
type CompleteFn = Box<dyn Fn() + Send + Sync>;

/// Subscriber assembled from closures, any of which may be left out.
pub struct PartialSubscriber<T, P = T> {
    next: Option<NextFn<T>>,
    error: Option<ErrorFn<P>>,
    complete: Option<CompleteFn>,
}

impl<T, P> PartialSubscriber<T, P>
where
    T: Send + 'static,
    P: Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            next: None,
            error: None,
            complete: None,
        }
    }

    pub fn on_next<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.next = Some(Box::new(move |payload| Box::pin(f(payload))));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(BoxError, &P) + Send + Sync + 'static,
    {
        self.error = Some(Box::new(f));
        self
    }

    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.complete = Some(Box::new(f));
        self
    }
}

impl<T, P> Default for PartialSubscriber<T, P>
where
    T: Send + 'static,
    P: Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T, P> Subscriber<T, P> for PartialSubscriber<T, P>
where
    T: Send + 'static,
    P: Sync + 'static,
{
    async fn next(&self, payload: T) -> Result<(), BoxError> {
        match &self.next {
            Some(next) => next(payload).await,
            None => Ok(()),
        }
    }

    fn error(&self, error: BoxError, payload: &P) {
        if let Some(on_error) = &self.error {
            on_error(error, payload);
        }
    }

    async fn complete(&self) {
        if let Some(on_complete) = &self.complete {
            on_complete();
        }
    }
}

impl<T, P> std::fmt::Debug for PartialSubscriber<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartialSubscriber")
            .field("next", &self.next.is_some())
            .field("error", &self.error.is_some())
            .field("complete", &self.complete.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    struct NextOnly;

    #[async_trait]
    impl Subscriber<u32> for NextOnly {
        async fn next(&self, payload: u32) -> Result<(), BoxError> {
            if payload == 0 {
                return Err("zero".into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn omitted_operations_are_noops() {
        let subscriber = NextOnly;
        assert!(subscriber.next(1).await.is_ok());
        assert!(subscriber.next(0).await.is_err());
        subscriber.error("ignored".into(), &0);
        subscriber.complete().await;
    }

    #[tokio::test]
    async fn empty_partial_subscriber_resolves() {
        let subscriber: PartialSubscriber<String> = PartialSubscriber::new();
        assert!(subscriber.next("x".to_string()).await.is_ok());
        subscriber.error("ignored".into(), &"x".to_string());
        subscriber.complete().await;
    }

    #[tokio::test]
    async fn partial_subscriber_calls_closures() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let completed = Arc::new(AtomicUsize::new(0));

        let errors_ref = errors.clone();
        let completed_ref = completed.clone();
        let subscriber = PartialSubscriber::<u32>::new()
            .on_next(|value| async move {
                if value % 2 == 0 {
                    return Err::<(), BoxError>(format!("even {value}").into());
                }
                Ok(())
            })
            .on_error(move |err, payload| {
                errors_ref
                    .lock()
                    .unwrap()
                    .push(format!("{payload}: {err}"));
            })
            .on_complete(move || {
                completed_ref.fetch_add(1, Ordering::SeqCst);
            });

        assert!(subscriber.next(1).await.is_ok());
        let err = subscriber.next(2).await.unwrap_err();
        subscriber.error(err, &2);
        subscriber.complete().await;

        assert_eq!(*errors.lock().unwrap(), vec!["2: even 2".to_string()]);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shared_subscriber_forwards() {
        let shared: SharedSubscriber<u32> = Arc::new(NextOnly);
        assert!(shared.next(5).await.is_ok());
        assert!(shared.next(0).await.is_err());
    }
}

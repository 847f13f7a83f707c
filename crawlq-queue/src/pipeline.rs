//! Left-to-right composition of subscriber wrappers.
//!
//! Wrappers are [`tower::Layer`]s over subscribers. [`Pipeline`] applies them
//! in the order they are given: the first layer wraps the base handler, the
//! last one is the outermost subscriber that ends up registered on the queue.

use async_trait::async_trait;
use tower::util::option_layer;

pub use tower::layer::util::Identity;
pub use tower::layer::{layer_fn, Layer, LayerFn};
pub use tower::util::Either;

use crate::{BoxError, Subscriber};

/// Either of two subscribers; produced by [`Pipeline::option_layer`].
#[async_trait]
impl<T, P, A, B> Subscriber<T, P> for Either<A, B>
where
    T: Send + 'static,
    P: Sync + 'static,
    A: Subscriber<T, P>,
    B: Subscriber<T, P>,
{
    async fn next(&self, payload: T) -> Result<(), BoxError> {
        match self {
            Either::Left(a) => a.next(payload).await,
            Either::Right(b) => b.next(payload).await,
        }
    }

    fn error(&self, error: BoxError, payload: &P) {
        match self {
            Either::Left(a) => a.error(error, payload),
            Either::Right(b) => b.error(error, payload),
        }
    }

    async fn complete(&self) {
        match self {
            Either::Left(a) => a.complete().await,
            Either::Right(b) => b.complete().await,
        }
    }
}

/// Builder threading a base subscriber through successive layers.
#[derive(Debug, Clone)]
pub struct Pipeline<S> {
    subscriber: S,
}

impl<S> Pipeline<S> {
    pub fn new(base: S) -> Self {
        Self { subscriber: base }
    }

    /// Wrap the current subscriber; the new layer becomes the outermost one.
    pub fn layer<L>(self, layer: L) -> Pipeline<L::Service>
    where
        L: Layer<S>,
    {
        Pipeline {
            subscriber: layer.layer(self.subscriber),
        }
    }

    /// Wrap only when a layer is given, otherwise keep the subscriber as is.
    pub fn option_layer<L>(self, layer: Option<L>) -> Pipeline<Either<L::Service, S>>
    where
        L: Layer<S>,
    {
        self.layer(option_layer(layer))
    }

    pub fn into_inner(self) -> S {
        self.subscriber
    }
}

/// Fold a homogeneous list of layers over `base`, first to last.
pub fn pipe<S, I>(base: S, layers: I) -> S
where
    I: IntoIterator,
    I::Item: Layer<S, Service = S>,
{
    layers
        .into_iter()
        .fold(base, |subscriber, layer| layer.layer(subscriber))
}

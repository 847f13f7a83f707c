//! Queue engine.
//!
//! Owns the FIFO backlog and the running counter, fans every dispatched item
//! out to all registered subscribers and completes them once the backlog is
//! empty with nothing in flight.
//!
//! All state transitions happen under one mutex that is never held across an
//! await, so the "try to run" evaluation triggered by enqueue, subscribe and
//! settle is serialized and a drain can neither be missed nor fire early.

use derive_builder::Builder;
use futures::{future::join_all, FutureExt};
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, info, warn, Instrument};

use crate::{BoxError, HandlerPanicked, QueueError, SharedSubscriber, Subscriber};

#[derive(Builder, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[builder(public, setter(into), build_fn(validate = "Self::validate"))]
pub struct QueueConfig {
    /// Maximum number of items delivered at the same time.
    #[builder(default = "1")]
    #[serde(default = "default_parallel_limit")]
    pub parallel_limit: usize,
}

fn default_parallel_limit() -> usize {
    1
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            parallel_limit: default_parallel_limit(),
        }
    }
}

impl QueueConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.parallel_limit {
            Some(0) => Err("parallel_limit must be higher than 0".to_string()),
            _ => Ok(()),
        }
    }
}

/// Handle to a queue. Cloning is cheap and every clone drives the same
/// backlog, which is how wrappers such as retry feed items back in.
///
/// Every method that can start work (`enqueue`, `subscribe`) spawns onto the
/// ambient Tokio runtime once a subscriber is registered.
pub struct Queue<P>
where
    P: Send + Sync + 'static,
{
    inner: Arc<Inner<P>>,
}

struct Inner<P>
where
    P: Send + Sync + 'static,
{
    parallel_limit: usize,
    state: Mutex<State<P>>,
}

struct State<P>
where
    P: Send + Sync + 'static,
{
    backlog: VecDeque<P>,
    running: usize,
    subscribers: Vec<SharedSubscriber<P>>,
}

enum Step<P>
where
    P: Send + Sync + 'static,
{
    Idle,
    Drain(Vec<SharedSubscriber<P>>),
    Dispatch(Vec<P>, Vec<SharedSubscriber<P>>),
}

impl<P> Queue<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        if config.parallel_limit < 1 {
            return Err(QueueError::InvalidParallelLimit(config.parallel_limit));
        }
        Ok(Self::from_limit(config.parallel_limit))
    }

    pub fn with_parallel_limit(parallel_limit: usize) -> Result<Self, QueueError> {
        Self::new(QueueConfig { parallel_limit })
    }

    fn from_limit(parallel_limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                parallel_limit,
                state: Mutex::new(State {
                    backlog: VecDeque::new(),
                    running: 0,
                    subscribers: Vec::new(),
                }),
            }),
        }
    }

    /// Append to the backlog. Always accepted.
    pub fn enqueue(&self, payload: P) {
        self.state().backlog.push_back(payload);
        self.try_to_run();
    }

    /// Register a subscriber. It receives every item dispatched from now on
    /// and is completed (then retired) the next time the queue drains.
    pub fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<P> + 'static,
    {
        self.subscribe_shared(Arc::new(subscriber));
    }

    pub fn subscribe_shared(&self, subscriber: SharedSubscriber<P>) {
        self.state().subscribers.push(subscriber);
        self.try_to_run();
    }

    /// Snapshot of the undispatched backlog, front first.
    pub fn get_queue(&self) -> Vec<P> {
        self.state().backlog.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state().backlog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().backlog.is_empty()
    }

    /// Number of dispatched items that have not settled yet.
    pub fn running(&self) -> usize {
        self.state().running
    }

    pub fn parallel_limit(&self) -> usize {
        self.inner.parallel_limit
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    fn state(&self) -> MutexGuard<'_, State<P>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn try_to_run(&self) {
        match self.next_step() {
            Step::Idle => {}
            Step::Drain(subscribers) => self.complete(subscribers),
            Step::Dispatch(batch, subscribers) => {
                for payload in batch {
                    self.dispatch(payload, subscribers.clone());
                }
            }
        }
    }

    fn next_step(&self) -> Step<P> {
        let limit = self.inner.parallel_limit;
        let mut state = self.state();

        if state.running >= limit || state.subscribers.is_empty() {
            return Step::Idle;
        }

        if state.backlog.is_empty() {
            if state.running == 0 {
                return Step::Drain(std::mem::take(&mut state.subscribers));
            }
            return Step::Idle;
        }

        let free_slots = limit - state.running;
        let take = free_slots.min(state.backlog.len());
        let batch: Vec<P> = state.backlog.drain(..take).collect();
        state.running += batch.len();
        Step::Dispatch(batch, state.subscribers.clone())
    }

    fn dispatch(&self, payload: P, subscribers: Vec<SharedSubscriber<P>>) {
        let settle = SettleGuard {
            queue: self.clone(),
        };
        let span = tracing::debug_span!("dispatch", subscribers = subscribers.len());

        tokio::spawn(
            async move {
                let _settle = settle;
                join_all(
                    subscribers
                        .iter()
                        .map(|subscriber| deliver(subscriber, &payload)),
                )
                .await;
                debug!("item settled");
            }
            .instrument(span),
        );
    }

    fn complete(&self, subscribers: Vec<SharedSubscriber<P>>) {
        info!(subscribers = subscribers.len(), "queue drained");
        tokio::spawn(async move {
            join_all(subscribers.iter().map(|subscriber| subscriber.complete())).await;
        });
    }

    fn settle(&self) {
        {
            let mut state = self.state();
            state.running = state.running.saturating_sub(1);
        }
        self.try_to_run();
    }
}

async fn deliver<P>(subscriber: &SharedSubscriber<P>, payload: &P)
where
    P: Clone + Send + Sync + 'static,
{
    let outcome = AssertUnwindSafe(subscriber.next(payload.clone()))
        .catch_unwind()
        .await;

    let error: BoxError = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(error)) => error,
        Err(panic) => Box::new(HandlerPanicked::from_panic(panic)),
    };
    debug!(%error, "subscriber failed to process item");
    let reported =
        std::panic::catch_unwind(AssertUnwindSafe(|| subscriber.error(error, payload)));
    if let Err(panic) = reported {
        let panicked = HandlerPanicked::from_panic(panic);
        warn!(error = %panicked, "subscriber error handler panicked");
    }
}

/// Decrements the running counter when a dispatch finishes, whichever way it
/// finishes.
struct SettleGuard<P>
where
    P: Clone + Send + Sync + 'static,
{
    queue: Queue<P>,
}

impl<P> Drop for SettleGuard<P>
where
    P: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        // Tasks dropped while the runtime shuts down only release their slot.
        if tokio::runtime::Handle::try_current().is_err() {
            let mut state = self.queue.state();
            state.running = state.running.saturating_sub(1);
            return;
        }
        self.queue.settle();
    }
}

impl<P> Clone for Queue<P>
where
    P: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> Default for Queue<P>
where
    P: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::from_limit(default_parallel_limit())
    }
}

impl<P> std::fmt::Debug for Queue<P>
where
    P: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        f.debug_struct("Queue")
            .field("parallel_limit", &self.inner.parallel_limit)
            .field("backlog_len", &state.backlog.len())
            .field("running", &state.running)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

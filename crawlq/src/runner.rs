//! Ready-made wrapper stacks.
//!
//! Both runners register one subscriber on the queue and resolve once that
//! subscriber completed, which is after the queue drained and every wrapper
//! finished its teardown.
//!
//! Layer order, innermost first:
//!
//! - [`run_basic_queue`]: timeout, min duration, retry, statistics, persistence
//! - [`run_resource_queue`]: timeout, min duration, resource, retry,
//!   statistics, persistence

use async_trait::async_trait;
use crawlq_config::RunnerConfig;
use crawlq_queue::{
    load_payloads_or, Attempt, BoxError, FileStorage, Pipeline, Queue, QueueConfig, QueueError,
    Subscriber,
};
use derive_builder::Builder;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::{
    min_duration::MinProcessingTimeLayer,
    persistence::{PersistenceConfig, PersistenceLayer},
    resource::{ResourceLayer, ResourceProvider, WithResource},
    retry::{RetryLayer, DEFAULT_RETRY_ATTEMPTS},
    statistics::{log_report, StatisticsConfig, StatisticsLayer},
    timeout::MaxProcessingTimeLayer,
};

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to restore checkpoint: {0}")]
    Restore(#[source] QueueError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Invalid runner options: {0}")]
    InvalidOptions(String),
    #[error("Queue stopped without completing the runner")]
    Interrupted,
}

#[derive(Builder)]
#[builder(
    public,
    pattern = "owned",
    setter(into),
    build_fn(validate = "Self::validate")
)]
pub struct RunnerOptions<P>
where
    P: Send + Sync + 'static,
{
    /// Fail `next` with a timeout error after this long.
    #[builder(default, setter(strip_option))]
    pub max_processing_time: Option<Duration>,
    /// Never let `next` resolve faster than this.
    #[builder(default, setter(strip_option))]
    pub min_processing_time: Option<Duration>,
    #[builder(default = "DEFAULT_RETRY_ATTEMPTS")]
    pub retry_attempts: u32,
    #[builder(default, setter(strip_option))]
    pub statistics: Option<StatisticsConfig>,
    #[builder(default, setter(strip_option))]
    pub persistence: Option<PersistenceConfig<P>>,
}

impl<P> RunnerOptionsBuilder<P>
where
    P: Send + Sync + 'static,
{
    fn validate(&self) -> Result<(), String> {
        if let Some(Some(statistics)) = &self.statistics {
            if statistics.interval.is_zero() {
                return Err("statistics interval must be higher than 0".to_string());
            }
        }
        if let Some(Some(persistence)) = &self.persistence {
            if persistence.interval.is_zero() {
                return Err("persistence interval must be higher than 0".to_string());
            }
        }
        if let (Some(Some(min)), Some(Some(max))) =
            (&self.min_processing_time, &self.max_processing_time)
        {
            if min > max {
                warn!(
                    ?min,
                    ?max,
                    "min processing time exceeds max processing time, every item will time out"
                );
            }
        }
        Ok(())
    }
}

impl<P> RunnerOptionsBuilder<P>
where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Options described by a [`RunnerConfig`]. Statistics are logged when an
    /// interval is configured, file checkpoints are written when a checkpoint
    /// key is configured.
    pub fn from_config(config: &RunnerConfig) -> Self {
        let mut builder = Self::default().retry_attempts(config.retry_attempts);
        if let Some(max) = config.max_processing_time() {
            builder = builder.max_processing_time(max);
        }
        if let Some(min) = config.min_processing_time() {
            builder = builder.min_processing_time(min);
        }
        if config.statistics_interval_ms.is_some() {
            builder = builder.statistics(
                StatisticsConfig::new(log_report).with_interval(config.statistics_interval()),
            );
        }
        if let Some(key) = &config.checkpoint_key {
            let storage = FileStorage::<P>::new(key, &config.checkpoint_dir);
            builder = builder.persistence(
                PersistenceConfig::new(Arc::new(storage))
                    .with_interval(config.persistence_interval()),
            );
        }
        builder
    }
}

impl<P> Default for RunnerOptions<P>
where
    P: Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            max_processing_time: None,
            min_processing_time: None,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            statistics: None,
            persistence: None,
        }
    }
}

/// Queue sized by a [`RunnerConfig`].
pub fn queue_from_config<P>(config: &RunnerConfig) -> Result<Queue<P>, RunnerError>
where
    P: Clone + Send + Sync + 'static,
{
    config
        .validate()
        .map_err(|e| RunnerError::InvalidOptions(e.to_string()))?;
    Ok(Queue::new(QueueConfig {
        parallel_limit: config.parallel_limit,
    })?)
}

/// Run `crawler` over `queue` until the queue drains.
pub async fn run_basic_queue<P, S>(
    queue: &Queue<P>,
    crawler: S,
    options: RunnerOptions<P>,
) -> Result<(), RunnerError>
where
    P: Attempt + Clone + Send + Sync + 'static,
    S: Subscriber<P> + 'static,
{
    let RunnerOptions {
        max_processing_time,
        min_processing_time,
        retry_attempts,
        statistics,
        persistence,
    } = options;

    let subscriber = Pipeline::new(crawler)
        .option_layer(max_processing_time.map(MaxProcessingTimeLayer::new))
        .option_layer(min_processing_time.map(MinProcessingTimeLayer::new))
        .layer(RetryLayer::new(queue.clone(), retry_attempts))
        .option_layer(statistics.map(|config| StatisticsLayer::new(queue.clone(), config)))
        .option_layer(persistence_layer(queue, persistence.as_ref()))
        .into_inner();

    run_to_completion(queue, subscriber, persistence).await
}

/// Run `crawler` over `queue` until the queue drains, giving every item a
/// resource from `provider`. The shared resource is shut down before this
/// resolves.
pub async fn run_resource_queue<P, S, R>(
    queue: &Queue<P>,
    crawler: S,
    provider: R,
    options: RunnerOptions<P>,
) -> Result<(), RunnerError>
where
    P: Attempt + Clone + Send + Sync + 'static,
    R: ResourceProvider,
    S: Subscriber<WithResource<P, R::Resource>, P> + 'static,
{
    let RunnerOptions {
        max_processing_time,
        min_processing_time,
        retry_attempts,
        statistics,
        persistence,
    } = options;

    let subscriber = Pipeline::new(crawler)
        .option_layer(max_processing_time.map(MaxProcessingTimeLayer::new))
        .option_layer(min_processing_time.map(MinProcessingTimeLayer::new))
        .layer(ResourceLayer::new(provider))
        .layer(RetryLayer::new(queue.clone(), retry_attempts))
        .option_layer(statistics.map(|config| StatisticsLayer::new(queue.clone(), config)))
        .option_layer(persistence_layer(queue, persistence.as_ref()))
        .into_inner();

    run_to_completion(queue, subscriber, persistence).await
}

fn persistence_layer<P>(
    queue: &Queue<P>,
    persistence: Option<&PersistenceConfig<P>>,
) -> Option<PersistenceLayer<P>>
where
    P: Send + Sync + 'static,
{
    persistence.map(|config| {
        PersistenceLayer::new(Arc::clone(&config.storage), queue.clone(), config.interval)
    })
}

async fn run_to_completion<P, S>(
    queue: &Queue<P>,
    subscriber: S,
    persistence: Option<PersistenceConfig<P>>,
) -> Result<(), RunnerError>
where
    P: Clone + Send + Sync + 'static,
    S: Subscriber<P> + 'static,
{
    if let Some(config) = persistence {
        let payloads = load_payloads_or(config.storage.as_ref(), config.initial_payloads)
            .await
            .map_err(RunnerError::Restore)?;
        info!(items = payloads.len(), "seeding queue");
        for payload in payloads {
            queue.enqueue(payload);
        }
    }

    let (done_tx, done_rx) = oneshot::channel();
    queue.subscribe(Completion {
        inner: subscriber,
        done: Mutex::new(Some(done_tx)),
    });

    done_rx.await.map_err(|_| RunnerError::Interrupted)?;
    info!("runner finished");
    Ok(())
}

/// Outermost subscriber of a runner. Signals the runner after every layer
/// below finished `complete`.
struct Completion<S> {
    inner: S,
    done: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl<P, S> Subscriber<P, P> for Completion<S>
where
    P: Send + Sync + 'static,
    S: Subscriber<P, P>,
{
    async fn next(&self, payload: P) -> Result<(), BoxError> {
        self.inner.next(payload).await
    }

    fn error(&self, error: BoxError, payload: &P) {
        self.inner.error(error, payload)
    }

    async fn complete(&self) {
        self.inner.complete().await;
        let done = self
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(done) = done {
            debug!("notifying runner");
            let _ = done.send(());
        }
    }
}

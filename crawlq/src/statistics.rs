//! Periodic processing statistics.
//!
//! Counts messages and errors per reporting interval and hands a
//! [`StatisticsReport`] to a callback. The interval starts with the first
//! message or error and stops when the queue completes.

use async_trait::async_trait;
use crawlq_queue::{BoxError, Layer, Queue, Subscriber};
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::info;

use crate::ticker::Ticker;

pub const DEFAULT_STATISTICS_INTERVAL: Duration = crawlq_config::DEFAULT_STATISTICS_INTERVAL;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StatisticsReport {
    pub interval: Duration,
    /// Messages started during the interval.
    pub messages_count: usize,
    pub errors_count: usize,
    /// `errors_count / messages_count`, `0` for an idle interval.
    pub error_rate: f64,
    pub in_progress_count: usize,
    pub queue_size: usize,
}

pub type ReportHandler = Arc<dyn Fn(StatisticsReport) + Send + Sync>;

/// Report callback and interval. The callback runs on the ticker task and is
/// expected not to panic.
#[derive(Clone)]
pub struct StatisticsConfig {
    pub on_report: ReportHandler,
    pub interval: Duration,
}

impl StatisticsConfig {
    pub fn new<F>(on_report: F) -> Self
    where
        F: Fn(StatisticsReport) + Send + Sync + 'static,
    {
        Self {
            on_report: Arc::new(on_report),
            interval: DEFAULT_STATISTICS_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl std::fmt::Debug for StatisticsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsConfig")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Report callback that writes the report to the log.
pub fn log_report(report: StatisticsReport) {
    info!(
        interval = ?report.interval,
        messages = report.messages_count,
        errors = report.errors_count,
        error_rate = report.error_rate,
        in_progress = report.in_progress_count,
        queue_size = report.queue_size,
        "statistics report"
    );
}

#[derive(Debug, Default)]
struct StatisticsWindow {
    messages: AtomicUsize,
    errors: AtomicUsize,
    in_progress: AtomicUsize,
}

impl StatisticsWindow {
    fn record_message(&self) {
        self.messages.fetch_add(1, Ordering::SeqCst);
        self.in_progress.fetch_add(1, Ordering::SeqCst);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn finish_message(&self) {
        self.in_progress.fetch_sub(1, Ordering::SeqCst);
    }

    /// Snapshot and reset the per-interval counters.
    fn take_report(&self, interval: Duration, queue_size: usize) -> StatisticsReport {
        let messages_count = self.messages.swap(0, Ordering::SeqCst);
        let errors_count = self.errors.swap(0, Ordering::SeqCst);
        let error_rate = if messages_count == 0 {
            0.0
        } else {
            errors_count as f64 / messages_count as f64
        };
        StatisticsReport {
            interval,
            messages_count,
            errors_count,
            error_rate,
            in_progress_count: self.in_progress.load(Ordering::SeqCst),
            queue_size,
        }
    }
}

/// Decrements the in-progress counter however `next` ends.
struct InProgress<'a>(&'a StatisticsWindow);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.finish_message();
    }
}

pub struct StatisticsLayer<P>
where
    P: Send + Sync + 'static,
{
    queue: Queue<P>,
    config: StatisticsConfig,
}

impl<P> StatisticsLayer<P>
where
    P: Send + Sync + 'static,
{
    /// `queue` is only read, to report the backlog size.
    pub fn new(queue: Queue<P>, config: StatisticsConfig) -> Self {
        Self { queue, config }
    }
}

impl<S, P> Layer<S> for StatisticsLayer<P>
where
    P: Send + Sync + 'static,
{
    type Service = Statistics<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        Statistics {
            inner,
            queue: self.queue.clone(),
            config: self.config.clone(),
            window: Arc::new(StatisticsWindow::default()),
            ticker: Ticker::new(self.config.interval),
        }
    }
}

pub struct Statistics<S, P>
where
    P: Send + Sync + 'static,
{
    inner: S,
    queue: Queue<P>,
    config: StatisticsConfig,
    window: Arc<StatisticsWindow>,
    ticker: Ticker,
}

impl<S, P> Statistics<S, P>
where
    P: Clone + Send + Sync + 'static,
{
    fn start_reporting(&self) {
        let window = Arc::clone(&self.window);
        let queue = self.queue.clone();
        let on_report = Arc::clone(&self.config.on_report);
        let interval = self.config.interval;

        self.ticker.start(move || {
            let report = window.take_report(interval, queue.len());
            on_report(report);
            async {}
        });
    }
}

#[async_trait]
impl<T, P, S> Subscriber<T, P> for Statistics<S, P>
where
    T: Send + 'static,
    P: Clone + Send + Sync + 'static,
    S: Subscriber<T, P>,
{
    async fn next(&self, payload: T) -> Result<(), BoxError> {
        self.start_reporting();
        self.window.record_message();
        let _in_progress = InProgress(&self.window);
        self.inner.next(payload).await
    }

    fn error(&self, error: BoxError, payload: &P) {
        self.start_reporting();
        self.window.record_error();
        self.inner.error(error, payload)
    }

    async fn complete(&self) {
        self.ticker.stop().await;
        self.inner.complete().await
    }
}

impl<S, P> std::fmt::Debug for Statistics<S, P>
where
    P: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statistics")
            .field("config", &self.config)
            .field("window", &self.window)
            .finish()
    }
}

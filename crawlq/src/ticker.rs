use std::{
    future::Future,
    sync::{Mutex, PoisonError},
    time::Duration,
};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

/// Shortest period a ticker runs with.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Background task running a callback on a fixed period. Started lazily by
/// the first caller, stopped explicitly or aborted when dropped.
#[derive(Debug)]
pub(crate) struct Ticker {
    period: Duration,
    running: Mutex<Option<Running>>,
}

#[derive(Debug)]
struct Running {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// A zero `period` is raised to [`MIN_PERIOD`].
    pub(crate) fn new(period: Duration) -> Self {
        let period = if period.is_zero() {
            warn!(min = ?MIN_PERIOD, "zero ticker period raised to the minimum");
            MIN_PERIOD
        } else {
            period
        };
        Self {
            period,
            running: Mutex::new(None),
        }
    }

    /// Spawn the ticking task unless it is already running. The first tick
    /// fires one period after the start.
    pub(crate) fn start<F, Fut>(&self, on_tick: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime available, ticker not started");
            return;
        };

        let period = self.period;
        let (stop, mut stopped) = oneshot::channel();
        let handle = runtime.spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = interval.tick() => on_tick().await,
                }
            }
        });
        *running = Some(Running { stop, handle });
    }

    /// Stop ticking. A tick that is in progress finishes first.
    pub(crate) async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Running { stop, handle }) = running {
            let _ = stop.send(());
            if let Err(e) = handle.await {
                debug!(error = %e, "ticker task ended abnormally");
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.handle.abort();
        }
    }
}

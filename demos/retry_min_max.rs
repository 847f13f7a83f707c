//! Slow first attempts time out and are retried, every attempt takes at
//! least one second.
use crawlq::observability::init_tracing;
use crawlq::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let queue = Queue::default();
    queue.enqueue(Attempted::new("https://fsharpforfunandprofit.com/".to_string()));
    queue.enqueue(Attempted::new("https://doc.rust-lang.org/".to_string()));

    let crawler = PartialSubscriber::<Attempted<String>>::new()
        .on_next(|page| async move {
            if page.attempt < 2 && page.contains("fsharp") {
                tracing::info!(url = %page.payload, attempt = page.attempt, "waiting 10s");
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            tracing::info!(url = %page.payload, attempt = page.attempt, "fetched");
            Ok::<(), BoxError>(())
        })
        .on_error(|error, page| {
            tracing::error!(url = %page.payload, attempt = page.attempt, %error, "giving up");
        });

    let options = RunnerOptionsBuilder::default()
        .min_processing_time(Duration::from_secs(1))
        .max_processing_time(Duration::from_secs(3))
        .retry_attempts(3u32)
        .statistics(StatisticsConfig::new(log_report).with_interval(Duration::from_secs(2)))
        .build()?;

    run_basic_queue(&queue, crawler, options).await?;
    tracing::info!("all urls crawled");
    Ok(())
}

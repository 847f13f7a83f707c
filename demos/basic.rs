//! Subscribe a handler to a queue by hand, without a runner.
use crawlq::observability::init_tracing;
use crawlq::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let queue = Queue::with_parallel_limit(2)?;
    for url in [
        "https://news.ycombinator.com/",
        "https://lobste.rs/",
        "https://example.com/",
    ] {
        queue.enqueue(url.to_string());
    }

    let done = Arc::new(Notify::new());
    let finished = done.clone();
    let crawler = PartialSubscriber::<String>::new()
        .on_next(|url| async move {
            // pretend to fetch
            tokio::time::sleep(Duration::from_millis(300)).await;
            if url.contains("example") {
                return Err::<(), BoxError>(format!("{url} answered 503").into());
            }
            tracing::info!(%url, "fetched");
            Ok(())
        })
        .on_error(|error, url| tracing::error!(%url, %error, "could not fetch"))
        .on_complete(move || finished.notify_one());

    let subscriber = Pipeline::new(crawler)
        .layer(MaxProcessingTimeLayer::new(Duration::from_secs(5)))
        .into_inner();
    queue.subscribe(subscriber);

    done.notified().await;
    tracing::info!("all urls crawled");
    Ok(())
}

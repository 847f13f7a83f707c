//! One browser per run, one page per url, settings from a YAML file and
//! checkpoints written to disk while crawling.
use async_trait::async_trait;
use crawlq::observability::init_tracing;
use crawlq::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../crawlq-config/fixtures/crawler.yml");

struct Crawler {
    config: serde_yaml::Value,
}

impl Configurable for Crawler {
    fn config(&self) -> &serde_yaml::Value {
        &self.config
    }
}

/// Stand-in for a browser automation session.
#[derive(Default)]
struct Browser {
    next_page: AtomicUsize,
}

#[derive(Debug, Clone)]
struct Tab {
    id: usize,
}

#[async_trait]
impl ResourceProvider for Browser {
    type Shared = String;
    type Resource = Tab;

    async fn launch(&self) -> Result<String, BoxError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok("headless-browser".to_string())
    }

    async fn acquire(&self, browser: &String) -> Result<Tab, BoxError> {
        let id = self.next_page.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%browser, id, "page opened");
        Ok(Tab { id })
    }

    async fn release(&self, tab: Tab) {
        tracing::debug!(id = tab.id, "page closed");
    }

    async fn shutdown(&self, browser: &String) {
        tracing::info!(%browser, "browser closed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app = Crawler {
        config: Crawler::load_config(CONFIG)?,
    };
    let mut runner_config = app.runner_config()?;
    // keep the demo short
    runner_config.min_processing_time_ms = Some(200);
    runner_config.max_processing_time_ms = Some(2_000);

    let seeds_file = app
        .get_config_value("app.seeds_file")
        .and_then(|v| v.as_str())
        .unwrap_or("seeds.txt");
    let seeds_path = Path::new(CONFIG).with_file_name(seeds_file);
    let seeds = Crawler::load_text_file_lines(seeds_path)?
        .into_iter()
        .map(Attempted::new)
        .collect::<Vec<_>>();

    let queue = queue_from_config::<Attempted<String>>(&runner_config)?;
    let mut options = RunnerOptionsBuilder::from_config(&runner_config).build()?;
    if let Some(persistence) = options.persistence.take() {
        options.persistence = Some(persistence.with_initial_payloads(seeds));
    }

    let crawler = PartialSubscriber::<WithResource<Attempted<String>, Tab>, Attempted<String>>::new()
        .on_next(|item| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tracing::info!(url = %item.payload.payload, tab = item.resource.id, "page rendered");
            Ok::<(), BoxError>(())
        })
        .on_error(|error, page| tracing::error!(url = %page.payload, %error, "crawl failed"));

    run_resource_queue(&queue, crawler, Browser::default(), options).await?;
    tracing::info!("crawl finished");
    Ok(())
}

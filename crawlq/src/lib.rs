//! # crawlq
//!
//! `crawlq` is a bounded-concurrency task queue for crawlers and other
//! asynchronous batch jobs. Work items are pushed into a FIFO backlog and
//! handed to subscribers, never more than `parallel_limit` at a time. Cross
//! cutting behavior is added by layering wrappers around the handler.
//!
//! ## Features
//!
//! - **Queue engine**: exact concurrency bound, fan-out to every subscriber and
//!   drain detection that survives items being added while work is running.
//! - **Wrappers**: max processing time, min processing time, retry with
//!   requeue, periodic statistics, checkpoint persistence and a per-item
//!   resource (e.g. a browser page) backed by one lazily launched shared
//!   resource.
//! - **Runners**: `run_basic_queue` and `run_resource_queue` assemble the
//!   usual wrapper stack and resolve once the queue drained.
//! - **Configuration**: YAML runner settings through [`config::Configurable`].
//!
//! ## Modules
//!
//! - `queue`: queue engine, subscriber contract, layers and storage.
//! - `config`: configuration loading.
//! - `timeout`, `min_duration`, `retry`, `statistics`, `resource`,
//!   `persistence`: the wrappers.
//! - `runner`: ready-made wrapper stacks.
//! - `observability`: tracing setup.
pub mod min_duration;
pub mod observability;
pub mod persistence;
pub mod prelude;
pub mod resource;
pub mod retry;
pub mod runner;
pub mod statistics;
pub mod timeout;

mod ticker;

pub use crawlq_config as config;
pub use crawlq_queue as queue;
// re-export
pub use async_trait;
pub use serde;
pub use thiserror;
pub use tracing;
pub use tracing_subscriber;

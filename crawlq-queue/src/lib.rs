pub mod payload;
pub mod pipeline;
pub mod queue;
pub mod serializers;
pub mod storage;
pub mod subscriber;

pub use crate::payload::{Attempt, Attempted};
pub use crate::pipeline::{layer_fn, pipe, Either, Identity, Layer, LayerFn, Pipeline};
pub use crate::queue::{Queue, QueueConfig, QueueConfigBuilder, QueueConfigBuilderError};
pub use crate::serializers::{JsonSerializer, PayloadSerializer};
pub use crate::storage::{
    clear_payloads, load_payloads, load_payloads_or, persist_payloads,
    AbstractStorage, FileStorage, InMemoryStorage, Storage,
};
pub use crate::subscriber::{PartialSubscriber, SharedSubscriber, Subscriber};

use std::any::Any;
use thiserror::Error;

/// Error type carried by a failing `next`. Wrappers that need to raise a
/// recognizable failure use a concrete error type and callers downcast.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Parallel limit must be higher than 0, got {0}")]
    InvalidParallelLimit(usize),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Raised in place of a handler outcome when `next` panicked.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("handler panicked: {message}")]
pub struct HandlerPanicked {
    pub message: String,
}

impl HandlerPanicked {
    pub(crate) fn from_panic(panic: Box<dyn Any + Send>) -> Self {
        let message = if let Some(msg) = panic.downcast_ref::<&str>() {
            (*msg).to_string()
        } else if let Some(msg) = panic.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self { message }
    }
}

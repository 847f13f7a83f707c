pub use crate::config::{Configurable, RunnerConfig};
pub use crate::min_duration::{MinProcessingTime, MinProcessingTimeLayer};
pub use crate::persistence::{Persistence, PersistenceConfig, PersistenceLayer};
pub use crate::queue::{
    Attempt, Attempted, BoxError, FileStorage, InMemoryStorage, Layer, PartialSubscriber,
    Pipeline, Queue, QueueConfig, Storage, Subscriber,
};
pub use crate::resource::{
    ResourceInitError, ResourceLayer, ResourceProvider, ResourceStage, WithResource,
};
pub use crate::retry::{Retry, RetryLayer};
pub use crate::runner::{
    queue_from_config, run_basic_queue, run_resource_queue, RunnerError, RunnerOptions,
    RunnerOptionsBuilder,
};
pub use crate::statistics::{log_report, StatisticsConfig, StatisticsLayer, StatisticsReport};
pub use crate::timeout::{is_timeout_error, MaxProcessingTimeLayer, ProcessingTimeout};

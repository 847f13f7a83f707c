pub mod config;
pub mod runner;

pub use config::{ConfigError, Configurable};
pub use runner::{
    RunnerConfig, DEFAULT_CHECKPOINT_DIR, DEFAULT_PERSISTENCE_INTERVAL,
    DEFAULT_STATISTICS_INTERVAL,
};

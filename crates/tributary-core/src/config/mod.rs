pub mod log;
pub mod runner;
pub mod store;

pub use log::LogConfig;
pub use runner::{BackoffStrategy, RetryConfig, RunnerConfig};
pub use store::{StoreConfig, SynchronousMode};

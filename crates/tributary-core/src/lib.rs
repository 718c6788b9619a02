//! Tributary Core: types and traits for the CDC projector
//!
//! This crate defines the shared vocabulary of the projection pipeline:
//! - Change stream: partitioned, manually committed source of CDC messages
//! - Change records: decoded envelopes and typed per-table rows
//! - Document store: nested university -> institute -> department documents
//! - Graph store: groups, students, schedules and attendance edges
//! - Dead-letter sink: where poison messages go after bounded retries
//!
//! Implementations live in `tributary-log` and `tributary-sqlite`; the
//! projection logic lives in `tributary-projector`.

pub mod config;
pub mod error;
pub mod observe;
pub mod traits;
pub mod types;

pub use config::{
    BackoffStrategy, LogConfig, RetryConfig, RunnerConfig, StoreConfig, SynchronousMode,
};
pub use error::{Result, TributaryError};
pub use traits::{ChangeStream, DeadLetter, DeadLetterSink, DocumentStore, GraphStore};
pub use types::{
    ChangeRecord, Department, Direction, EndpointPolicy, Fields, GraphChange, HierarchyChange,
    Institute, Label, NodeRef, Operation, Position, Properties, RelType, SourceMessage,
    University,
};

//! Tributary: CDC projection into documents and a property graph
//!
//! Tributary consumes Debezium-style change events and keeps two stores
//! converged with the source tables:
//! - **Hierarchy**: one nested document per university (institutes, departments)
//! - **Graph**: groups, students, schedules and attendance edges
//! - **Change log**: partitioned file log with committed consumer-group offsets
//! - **Dead-letter queue**: messages that kept failing after bounded retries
//!
//! # Quick Start
//!
//! ```no_run
//! use tributary::prelude::*;
//! use serde_json::json;
//!
//! # async fn run() -> Result<()> {
//! let pipeline = Pipeline::open("./data")?;
//!
//! pipeline.publish(
//!     Table::Institutes,
//!     Some(&json!({"op": "c", "after": {"institute_id": 5, "university_id": 1, "name": "Eng"}})),
//! )?;
//!
//! let mut runner = pipeline.hierarchy_runner()?;
//! runner.run_until_idle().await?;
//! # Ok(())
//! # }
//! ```

pub mod pipeline;
pub mod prelude;

// Re-export core types
pub use tributary_core::{
    config::{BackoffStrategy, LogConfig, RetryConfig, RunnerConfig, StoreConfig, SynchronousMode},
    error::{Result, TributaryError},
    traits::{ChangeStream, DeadLetter, DeadLetterSink, DocumentStore, GraphStore},
    types::{
        ChangeRecord, Department, Direction, EndpointPolicy, GraphChange, HierarchyChange,
        Institute, Label, NodeRef, Operation, Position, Properties, RelType, SourceMessage,
        University,
    },
};

// Re-export implementations
pub use tributary_log::{FileChangeLog, LogConsumer};
pub use tributary_projector::{
    decode, replay, route, GraphProjector, HierarchyProjector, Outcome, PendingBuffer,
    Projection, ProjectionRunner, Route, RunStats, ShutdownHandle, Table, Target,
};
pub use tributary_sqlite::{DeadLetterQueue, SqliteDocumentStore, SqliteGraphStore};

pub use pipeline::{GraphRunner, HierarchyRunner, Pipeline, PipelineConfig};

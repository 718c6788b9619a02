//! Tributary Prelude
//!
//! ```
//! use tributary::prelude::*;
//! ```

// Pipeline
pub use crate::{GraphRunner, HierarchyRunner, Pipeline, PipelineConfig, RunStats};

// Core types
pub use crate::{ChangeRecord, Operation, Position, Result, SourceMessage, TributaryError};

// Configs
pub use crate::{BackoffStrategy, LogConfig, RetryConfig, RunnerConfig, StoreConfig};

// Traits
pub use crate::{ChangeStream, DeadLetterSink, DocumentStore, GraphStore, Projection};

// Implementations
pub use crate::{
    DeadLetterQueue, FileChangeLog, GraphProjector, HierarchyProjector, ProjectionRunner,
    SqliteDocumentStore, SqliteGraphStore,
};

// Routing
pub use crate::{GraphChange, HierarchyChange, NodeRef, RelType, Route, Table, Target};

// Re-export common external deps
pub use anyhow;
pub use serde::{Deserialize, Serialize};
pub use std::sync::Arc;
pub use tracing;

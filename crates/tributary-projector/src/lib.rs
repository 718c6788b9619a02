//! Projector: from change messages to target stores
//!
//! Consumes CDC messages from a [`ChangeStream`](tributary_core::ChangeStream)
//! and folds them into the document or graph store.
//!
//! Key pieces:
//! - Decoder: wire envelope to change record, tombstones skipped
//! - Router: change record to typed hierarchy or graph change
//! - Pending buffer: children that arrived before their parent
//! - Hierarchy and graph projectors
//! - Runner: bounded retry with backoff, dead-letter hand-off, commit after apply

pub mod decoder;
pub mod graph;
pub mod hierarchy;
pub mod pending;
pub mod projection;
pub mod router;
pub mod runner;

pub use decoder::decode;
pub use graph::GraphProjector;
pub use hierarchy::HierarchyProjector;
pub use pending::{Held, PendingBuffer};
pub use projection::{Outcome, Projection};
pub use router::{route, Route, Table, Target};
pub use runner::{replay, ProjectionRunner, RunStats, ShutdownHandle};

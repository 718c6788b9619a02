//! SQLite-backed target stores
//!
//! - [`SqliteDocumentStore`]: one JSON document per university
//! - [`SqliteGraphStore`]: labelled nodes with JSON properties and typed edges
//! - [`DeadLetterQueue`]: messages that exhausted their retries
//!
//! Every mutating primitive runs in its own SQLite transaction, so a failed
//! write leaves the store as it was and the message can be retried.

pub mod connection;
pub mod dead_letter_queue;
pub mod document;
pub mod graph;

pub use dead_letter_queue::DeadLetterQueue;
pub use document::SqliteDocumentStore;
pub use graph::SqliteGraphStore;

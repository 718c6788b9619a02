//! File-based change log
//!
//! A local, broker-shaped source for the projector: topics split into
//! partitions, dense per-partition offsets, tombstones, and consumer groups
//! whose offsets move only on explicit commit.
//!
//! Layout under `base_dir`:
//! - `topics/<topic>/<partition>.log`: framed entries
//! - `groups/<group>.json`: committed next-offsets per topic-partition

mod consumer;
mod frame;
mod store;

pub use consumer::LogConsumer;
pub use store::FileChangeLog;

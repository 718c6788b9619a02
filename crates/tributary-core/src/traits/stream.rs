use crate::error::Result;
use crate::types::{Position, SourceMessage};

/// A partitioned, at-least-once source of change messages
///
/// Offsets are committed manually and only by the caller.
pub trait ChangeStream: Send {
    /// Fetch up to `max` messages, preserving per-partition order
    ///
    /// Returns an empty vector when the stream is drained.
    fn poll(&mut self, max: usize) -> Result<Vec<SourceMessage>>;

    /// Commit `position`: the next fetch after a restart starts at
    /// `position.offset + 1` for that topic-partition.
    fn commit(&mut self, position: &Position) -> Result<()>;

    /// Forget fetched-but-uncommitted progress; the next poll starts again
    /// at the committed offset of every partition
    fn seek_to_committed(&mut self) -> Result<()>;

    /// Next offset to be read after a restart, if anything was committed
    fn committed(&self, topic: &str, partition: i32) -> Result<Option<i64>>;
}

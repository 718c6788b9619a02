use crate::error::{Result, TributaryError};
use crate::types::SourceMessage;
use serde::{Deserialize, Serialize};

/// A message that exhausted its retries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: i64,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub error_message: String,
    pub attempts: i64,
    pub failed_at: String,
    pub retry_count: i64,
}

impl DeadLetter {
    /// Rebuild the original message for replay
    pub fn message(&self) -> SourceMessage {
        SourceMessage {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
            key: self.key.clone(),
            value: self.value.clone(),
        }
    }
}

/// Destination for poison messages
pub trait DeadLetterSink: Send + Sync {
    /// Persist the failed message. Returns the dead-letter id.
    fn add(&self, message: &SourceMessage, error: &TributaryError, attempts: usize)
        -> Result<i64>;
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column name to scalar value, as carried in the `before`/`after` maps
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A raw message as delivered by the change stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    /// `None` (or empty) is a tombstone
    pub value: Option<Vec<u8>>,
}

impl SourceMessage {
    pub fn position(&self) -> Position {
        Position {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
        }
    }

    /// Source table: the topic's trailing dot-segment
    pub fn table(&self) -> &str {
        self.topic.rsplit('.').next().unwrap_or(&self.topic)
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.as_ref().map_or(true, |v| v.is_empty())
    }
}

/// Stream position of a single message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]@{}", self.topic, self.partition, self.offset)
    }
}

/// Row-level operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Update,
    /// Snapshot read
    Read,
    Delete,
}

impl Operation {
    /// Parse the one-letter `op` discriminator
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "c" => Some(Operation::Create),
            "u" => Some(Operation::Update),
            "r" => Some(Operation::Read),
            "d" => Some(Operation::Delete),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Operation::Create => "c",
            Operation::Update => "u",
            Operation::Read => "r",
            Operation::Delete => "d",
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Operation::Delete)
    }
}

/// A decoded change event
///
/// `Delete` always carries `before` and no `after`; every other operation
/// carries `after`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub table: String,
    pub operation: Operation,
    pub before: Option<Fields>,
    pub after: Option<Fields>,
}

impl ChangeRecord {
    /// The field map that describes the row for this operation
    pub fn row(&self) -> Option<&Fields> {
        if self.operation.is_delete() {
            self.before.as_ref()
        } else {
            self.after.as_ref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_trailing_topic_segment() {
        let msg = SourceMessage {
            topic: "university_db.public.departments".into(),
            partition: 0,
            offset: 4,
            key: None,
            value: None,
        };
        assert_eq!(msg.table(), "departments");
        assert!(msg.is_tombstone());
        assert_eq!(msg.position().to_string(), "university_db.public.departments[0]@4");
    }

    #[test]
    fn operation_codes() {
        for op in [
            Operation::Create,
            Operation::Update,
            Operation::Read,
            Operation::Delete,
        ] {
            assert_eq!(Operation::from_code(op.code()), Some(op));
        }
        assert_eq!(Operation::from_code("t"), None);
    }
}

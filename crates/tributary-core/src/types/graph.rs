//! Node and relationship vocabulary of the academic-activity graph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Node properties
pub type Properties = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    Group,
    Student,
    Schedule,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Group => "Group",
            Label::Student => "Student",
            Label::Schedule => "Schedule",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Group" => Some(Label::Group),
            "Student" => Some(Label::Student),
            "Schedule" => Some(Label::Schedule),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelType {
    /// Student -> Group
    BelongsTo,
    /// Group -> Schedule
    HasSchedule,
    /// Student -> Schedule
    Attended,
}

impl RelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelType::BelongsTo => "BELONGS_TO",
            RelType::HasSchedule => "HAS_SCHEDULE",
            RelType::Attended => "ATTENDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BELONGS_TO" => Some(RelType::BelongsTo),
            "HAS_SCHEDULE" => Some(RelType::HasSchedule),
            "ATTENDED" => Some(RelType::Attended),
            _ => None,
        }
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a node: label plus source identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub label: Label,
    pub id: i64,
}

impl NodeRef {
    pub fn group(id: i64) -> Self {
        Self {
            label: Label::Group,
            id,
        }
    }

    pub fn student(id: i64) -> Self {
        Self {
            label: Label::Student,
            id,
        }
    }

    pub fn schedule(id: i64) -> Self {
        Self {
            label: Label::Schedule,
            id,
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.label, self.id)
    }
}

/// What `merge_edge` does when an endpoint node is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointPolicy {
    /// Create a property-less stub node for the missing endpoint
    CreateStubs,
    /// Leave the graph untouched
    RequireExisting,
}

/// Which side of a relationship a node sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

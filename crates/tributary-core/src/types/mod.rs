pub mod document;
pub mod graph;
pub mod message;
pub mod rows;

pub use document::{Department, Institute, University};
pub use graph::{Direction, EndpointPolicy, Label, NodeRef, Properties, RelType};
pub use message::{ChangeRecord, Fields, Operation, Position, SourceMessage};
pub use rows::{
    AttendanceRow, DepartmentRow, GraphChange, GroupRow, HierarchyChange, InstituteRow,
    ScheduleRow, StudentRow, UniversityRow,
};

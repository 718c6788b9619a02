//! Table name to typed change.
//!
//! Field maps are decoded into row types exactly once, here; projectors only
//! ever see [`HierarchyChange`] and [`GraphChange`] values.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use tributary_core::{
    error::{Result, TributaryError},
    types::{
        AttendanceRow, DepartmentRow, GroupRow, InstituteRow, ScheduleRow, StudentRow,
        UniversityRow,
    },
    ChangeRecord, Fields, GraphChange, HierarchyChange,
};

/// Replicated source tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Universities,
    Institutes,
    Departments,
    Groups,
    Students,
    Schedules,
    Attendances,
}

/// Which projection a table feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Hierarchy,
    Graph,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Universities,
        Table::Institutes,
        Table::Departments,
        Table::Groups,
        Table::Students,
        Table::Schedules,
        Table::Attendances,
    ];

    /// Source table name as it appears in the topic
    pub fn name(&self) -> &'static str {
        match self {
            Table::Universities => "universities",
            Table::Institutes => "institutes",
            Table::Departments => "departments",
            Table::Groups => "groups",
            Table::Students => "students",
            Table::Schedules => "shedule_full_materialized",
            Table::Attendances => "attendances",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn target(&self) -> Target {
        match self {
            Table::Universities | Table::Institutes | Table::Departments => Target::Hierarchy,
            _ => Target::Graph,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Hierarchy => "hierarchy",
            Target::Graph => "graph",
        }
    }

    pub fn tables(&self) -> Vec<Table> {
        Table::ALL
            .into_iter()
            .filter(|t| t.target() == *self)
            .collect()
    }

    /// Topics this target consumes, e.g. `university_db.public.groups`
    pub fn topics(&self, prefix: &str) -> Vec<String> {
        self.tables()
            .into_iter()
            .map(|t| format!("{}.{}", prefix, t.name()))
            .collect()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of routing one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Hierarchy(HierarchyChange),
    Graph(GraphChange),
    /// Table this projector does not know; skipped
    Unknown(String),
}

impl Route {
    pub fn target(&self) -> Option<Target> {
        match self {
            Route::Hierarchy(_) => Some(Target::Hierarchy),
            Route::Graph(_) => Some(Target::Graph),
            Route::Unknown(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct UniversityKey {
    university_id: i64,
}

#[derive(Deserialize)]
struct InstituteKey {
    university_id: i64,
    institute_id: i64,
}

#[derive(Deserialize)]
struct DepartmentKey {
    institute_id: i64,
    #[serde(rename = "dept_id")]
    department_id: i64,
}

#[derive(Deserialize)]
struct GroupKey {
    group_id: i64,
}

#[derive(Deserialize)]
struct StudentKey {
    student_id: i64,
}

#[derive(Deserialize)]
struct ScheduleKey {
    #[serde(rename = "shedule_id")]
    schedule_id: i64,
}

#[derive(Deserialize)]
struct AttendanceKey {
    student_id: i64,
    #[serde(rename = "shedule_id")]
    schedule_id: i64,
}

fn typed<T: DeserializeOwned>(record: &ChangeRecord) -> Result<T> {
    let fields: &Fields = record.row().ok_or_else(|| {
        TributaryError::Decode(format!("{} {:?} without row", record.table, record.operation))
    })?;
    serde_json::from_value(serde_json::Value::Object(fields.clone())).map_err(|e| {
        TributaryError::Decode(format!(
            "{} {}: {}",
            record.table,
            record.operation.code(),
            e
        ))
    })
}

/// Map a decoded record to its typed change.
///
/// Row decode failures are [`TributaryError::Decode`]. Unknown tables are
/// not an error.
pub fn route(record: &ChangeRecord) -> Result<Route> {
    let Some(table) = Table::from_name(&record.table) else {
        return Ok(Route::Unknown(record.table.clone()));
    };
    let delete = record.operation.is_delete();

    let route = match table {
        Table::Universities if delete => {
            let k: UniversityKey = typed(record)?;
            Route::Hierarchy(HierarchyChange::DeleteUniversity {
                university_id: k.university_id,
            })
        }
        Table::Universities => {
            Route::Hierarchy(HierarchyChange::UpsertUniversity(typed::<UniversityRow>(record)?))
        }
        Table::Institutes if delete => {
            let k: InstituteKey = typed(record)?;
            Route::Hierarchy(HierarchyChange::DeleteInstitute {
                university_id: k.university_id,
                institute_id: k.institute_id,
            })
        }
        Table::Institutes => {
            Route::Hierarchy(HierarchyChange::UpsertInstitute(typed::<InstituteRow>(record)?))
        }
        Table::Departments if delete => {
            let k: DepartmentKey = typed(record)?;
            Route::Hierarchy(HierarchyChange::DeleteDepartment {
                institute_id: k.institute_id,
                department_id: k.department_id,
            })
        }
        Table::Departments => {
            Route::Hierarchy(HierarchyChange::UpsertDepartment(typed::<DepartmentRow>(record)?))
        }
        Table::Groups if delete => {
            let k: GroupKey = typed(record)?;
            Route::Graph(GraphChange::DeleteGroup {
                group_id: k.group_id,
            })
        }
        Table::Groups => Route::Graph(GraphChange::UpsertGroup(typed::<GroupRow>(record)?)),
        Table::Students if delete => {
            let k: StudentKey = typed(record)?;
            Route::Graph(GraphChange::DeleteStudent {
                student_id: k.student_id,
            })
        }
        Table::Students => Route::Graph(GraphChange::UpsertStudent(typed::<StudentRow>(record)?)),
        Table::Schedules if delete => {
            let k: ScheduleKey = typed(record)?;
            Route::Graph(GraphChange::DeleteSchedule {
                schedule_id: k.schedule_id,
            })
        }
        Table::Schedules => {
            Route::Graph(GraphChange::UpsertSchedule(typed::<ScheduleRow>(record)?))
        }
        Table::Attendances if delete => {
            let k: AttendanceKey = typed(record)?;
            Route::Graph(GraphChange::DeleteAttendance {
                student_id: k.student_id,
                schedule_id: k.schedule_id,
            })
        }
        Table::Attendances => {
            Route::Graph(GraphChange::Attendance(typed::<AttendanceRow>(record)?))
        }
    };
    Ok(route)
}

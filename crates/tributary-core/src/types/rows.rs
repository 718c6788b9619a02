//! Typed source rows, one per replicated table.
//!
//! Field names follow the relational schema (`dept_id`, `shedule_id`,
//! `full_name`), so rows deserialize straight from the envelope's field maps.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniversityRow {
    pub university_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstituteRow {
    pub institute_id: i64,
    pub university_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentRow {
    #[serde(rename = "dept_id")]
    pub department_id: i64,
    pub institute_id: i64,
    pub name: String,
    #[serde(default)]
    pub head: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRow {
    pub group_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRow {
    pub student_id: i64,
    pub group_id: i64,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRow {
    #[serde(rename = "shedule_id")]
    pub schedule_id: i64,
    pub group_id: i64,
    pub title: String,
    /// Days since 1970-01-01
    pub start_time: i64,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub course_id: Option<i64>,
    #[serde(default)]
    pub course_title: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRow {
    pub student_id: i64,
    #[serde(rename = "shedule_id")]
    pub schedule_id: i64,
    /// A missing column reads as attended; an explicit `null` does not
    #[serde(default = "presence_when_absent")]
    pub presence: Option<bool>,
}

fn presence_when_absent() -> Option<bool> {
    Some(true)
}

impl AttendanceRow {
    pub fn attended(&self) -> bool {
        self.presence.unwrap_or(false)
    }
}

/// A change routed to the hierarchy (document) projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyChange {
    UpsertUniversity(UniversityRow),
    DeleteUniversity {
        university_id: i64,
    },
    UpsertInstitute(InstituteRow),
    DeleteInstitute {
        university_id: i64,
        institute_id: i64,
    },
    UpsertDepartment(DepartmentRow),
    DeleteDepartment {
        institute_id: i64,
        department_id: i64,
    },
}

/// A change routed to the academic-activity (graph) projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphChange {
    UpsertGroup(GroupRow),
    DeleteGroup { group_id: i64 },
    UpsertStudent(StudentRow),
    DeleteStudent { student_id: i64 },
    UpsertSchedule(ScheduleRow),
    DeleteSchedule { schedule_id: i64 },
    Attendance(AttendanceRow),
    DeleteAttendance { student_id: i64, schedule_id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn department_row_uses_source_column_names() {
        let row: DepartmentRow = serde_json::from_value(json!({
            "dept_id": 7,
            "institute_id": 2,
            "name": "CS",
            "head": "Ivanov",
            "phone": null
        }))
        .unwrap();
        assert_eq!(row.department_id, 7);
        assert_eq!(row.head.as_deref(), Some("Ivanov"));
        assert_eq!(row.phone, None);
    }

    #[test]
    fn missing_presence_reads_as_attended() {
        let absent: AttendanceRow =
            serde_json::from_value(json!({"student_id": 3, "shedule_id": 10})).unwrap();
        let null: AttendanceRow =
            serde_json::from_value(json!({"student_id": 3, "shedule_id": 10, "presence": null}))
                .unwrap();
        let missed: AttendanceRow =
            serde_json::from_value(json!({"student_id": 3, "shedule_id": 10, "presence": false}))
                .unwrap();
        assert!(absent.attended());
        assert!(!null.attended());
        assert!(!missed.attended());
    }
}

//! Nested documents of the organizational hierarchy.

use serde::{Deserialize, Serialize};

/// One document per university
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct University {
    pub university_id: i64,
    /// `None` while the university exists only as the holder of an
    /// institute that arrived first
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub institutes: Vec<Institute>,
}

impl University {
    pub fn new(university_id: i64) -> Self {
        Self {
            university_id,
            name: None,
            institutes: Vec::new(),
        }
    }

    pub fn institute(&self, institute_id: i64) -> Option<&Institute> {
        self.institutes
            .iter()
            .find(|i| i.institute_id == institute_id)
    }

    pub fn institute_mut(&mut self, institute_id: i64) -> Option<&mut Institute> {
        self.institutes
            .iter_mut()
            .find(|i| i.institute_id == institute_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institute {
    pub institute_id: i64,
    pub name: String,
    #[serde(default)]
    pub departments: Vec<Department>,
}

impl Institute {
    pub fn new(institute_id: i64, name: impl Into<String>) -> Self {
        Self {
            institute_id,
            name: name.into(),
            departments: Vec::new(),
        }
    }

    pub fn department(&self, department_id: i64) -> Option<&Department> {
        self.departments
            .iter()
            .find(|d| d.department_id == department_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub department_id: i64,
    pub name: String,
    #[serde(default)]
    pub head: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

use crate::error::Result;
use crate::types::{Department, Institute, University};

/// Nested-document store holding one document per university
///
/// The hierarchy projector composes these primitives into
/// attempt-update / on-no-match-insert steps. Each call must be atomic per
/// document. Identifiers are opaque equality keys.
pub trait DocumentStore: Send + Sync {
    /// Set the university name; create the document with an empty
    /// institute list if it does not exist
    fn upsert_university(&self, university_id: i64, name: &str) -> Result<()>;

    /// Remove the university document. Returns whether it existed.
    fn delete_university(&self, university_id: i64) -> Result<bool>;

    fn university(&self, university_id: i64) -> Result<Option<University>>;

    /// All documents, ordered by university id
    fn universities(&self) -> Result<Vec<University>>;

    /// Locate an institute anywhere in the store, with its holder's id
    fn find_institute(&self, institute_id: i64) -> Result<Option<(i64, Institute)>>;

    fn institute_exists(&self, institute_id: i64) -> Result<bool>;

    /// Pull the institute out of every university except `keep_university`.
    /// Returns the number of documents changed.
    fn pull_institute_except(&self, institute_id: i64, keep_university: i64) -> Result<usize>;

    /// Rename the institute in place inside `university_id`. Returns `false`
    /// when the institute is not in that university.
    fn set_institute_name(&self, university_id: i64, institute_id: i64, name: &str)
        -> Result<bool>;

    /// Append the institute to the university's list, creating a bare
    /// university document if none exists
    fn push_institute(&self, university_id: i64, institute: &Institute) -> Result<()>;

    /// Pull the institute from one university. Returns whether it was there.
    fn pull_institute(&self, university_id: i64, institute_id: i64) -> Result<bool>;

    /// Pull the department out of every institute except `keep_institute`.
    /// Returns the number of institutes changed.
    fn pull_department_except(&self, department_id: i64, keep_institute: i64) -> Result<usize>;

    /// Replace the department's fields in place inside `institute_id`.
    /// Returns `false` when it is not there.
    fn update_department(&self, institute_id: i64, department: &Department) -> Result<bool>;

    /// Append the department to the institute. Returns `false` when the
    /// institute is not in the store.
    fn push_department(&self, institute_id: i64, department: &Department) -> Result<bool>;

    /// Pull the department from the institute. Returns whether it was there.
    fn pull_department(&self, institute_id: i64, department_id: i64) -> Result<bool>;
}

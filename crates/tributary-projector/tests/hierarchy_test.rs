//! Hierarchy projection against an in-memory SQLite document store

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tributary_core::error::{Result, TributaryError};
use tributary_core::types::{DepartmentRow, InstituteRow, UniversityRow};
use tributary_core::{Department, DocumentStore, HierarchyChange, Institute, University};
use tributary_projector::{HierarchyProjector, Outcome};
use tributary_sqlite::SqliteDocumentStore;

fn projector() -> HierarchyProjector<SqliteDocumentStore> {
    HierarchyProjector::new(Arc::new(SqliteDocumentStore::open_in_memory().unwrap()))
}

fn university(id: i64, name: &str) -> HierarchyChange {
    HierarchyChange::UpsertUniversity(UniversityRow {
        university_id: id,
        name: name.into(),
    })
}

fn institute(id: i64, university_id: i64, name: &str) -> HierarchyChange {
    HierarchyChange::UpsertInstitute(InstituteRow {
        institute_id: id,
        university_id,
        name: name.into(),
    })
}

fn department(id: i64, institute_id: i64, name: &str) -> HierarchyChange {
    HierarchyChange::UpsertDepartment(DepartmentRow {
        department_id: id,
        institute_id,
        name: name.into(),
        head: Some("Petrov".into()),
        phone: None,
    })
}

fn snapshot(p: &HierarchyProjector<SqliteDocumentStore>) -> Vec<University> {
    p.store().universities().unwrap()
}

fn holders_of_institute(docs: &[University], institute_id: i64) -> Vec<i64> {
    docs.iter()
        .filter(|u| u.institute(institute_id).is_some())
        .map(|u| u.university_id)
        .collect()
}

#[test]
fn every_upsert_is_idempotent() {
    let changes = [
        university(1, "MSU"),
        institute(5, 1, "Eng"),
        department(9, 5, "Math"),
    ];

    for change in &changes {
        let mut once = projector();
        let mut twice = projector();
        for c in &changes {
            once.handle(c.clone()).unwrap();
            twice.handle(c.clone()).unwrap();
            if c == change {
                twice.handle(c.clone()).unwrap();
            }
        }
        assert_eq!(snapshot(&once), snapshot(&twice));
    }
}

#[test]
fn university_upsert_starts_with_empty_institutes() {
    let mut p = projector();
    p.handle(university(1, "MSU")).unwrap();
    let doc = p.store().university(1).unwrap().unwrap();
    assert_eq!(doc.name.as_deref(), Some("MSU"));
    assert!(doc.institutes.is_empty());
}

#[test]
fn department_before_institute_matches_reverse_order() {
    let mut child_first = projector();
    child_first.handle(university(1, "MSU")).unwrap();
    assert_eq!(
        child_first.handle(department(9, 5, "Math")).unwrap(),
        Outcome::Deferred
    );
    child_first.handle(institute(5, 1, "Eng")).unwrap();

    let mut parent_first = projector();
    parent_first.handle(university(1, "MSU")).unwrap();
    parent_first.handle(institute(5, 1, "Eng")).unwrap();
    assert_eq!(
        parent_first.handle(department(9, 5, "Math")).unwrap(),
        Outcome::Applied
    );

    assert_eq!(snapshot(&child_first), snapshot(&parent_first));
    assert_eq!(child_first.pending_for(5), 0);
}

#[test]
fn buffered_department_is_nested_after_institute_arrives() {
    let mut p = projector();
    p.handle(department(9, 5, "Math")).unwrap();
    assert!(snapshot(&p).is_empty());

    p.handle(institute(5, 1, "Eng")).unwrap();

    let doc = p.store().university(1).unwrap().unwrap();
    let inst = doc.institute(5).unwrap();
    assert_eq!(inst.name, "Eng");
    assert_eq!(inst.department(9).unwrap().name, "Math");
}

#[test]
fn buffered_departments_flush_once_keeping_newest_row() {
    let mut p = projector();
    p.handle(department(1, 5, "first")).unwrap();
    p.handle(department(2, 5, "second")).unwrap();
    p.handle(department(1, 5, "first, renamed")).unwrap();
    assert_eq!(p.pending_for(5), 2);

    p.handle(institute(5, 1, "Eng")).unwrap();
    p.handle(institute(5, 1, "Eng")).unwrap();

    let doc = p.store().university(1).unwrap().unwrap();
    let names: Vec<_> = doc
        .institute(5)
        .unwrap()
        .departments
        .iter()
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(names, vec!["second", "first, renamed"]);
}

#[test]
fn newer_department_change_discards_stale_buffered_row() {
    let mut p = projector();
    p.handle(institute(6, 1, "Sci")).unwrap();
    assert_eq!(
        p.handle(department(9, 5, "Math")).unwrap(),
        Outcome::Deferred
    );
    assert_eq!(
        p.handle(department(9, 6, "Math")).unwrap(),
        Outcome::Applied
    );
    assert_eq!(p.pending_for(5), 0);

    p.handle(institute(5, 1, "Eng")).unwrap();

    let doc = p.store().university(1).unwrap().unwrap();
    assert!(doc.institute(5).unwrap().department(9).is_none());
    assert_eq!(doc.institute(6).unwrap().department(9).unwrap().name, "Math");
}

#[test]
fn department_deferred_under_another_institute_replaces_older_row() {
    let mut p = projector();
    p.handle(department(9, 5, "Math")).unwrap();
    p.handle(department(9, 7, "Math")).unwrap();
    assert_eq!(p.pending_for(5), 0);
    assert_eq!(p.pending_for(7), 1);

    p.handle(institute(5, 1, "Eng")).unwrap();
    p.handle(institute(7, 1, "Sci")).unwrap();

    let doc = p.store().university(1).unwrap().unwrap();
    assert!(doc.institute(5).unwrap().departments.is_empty());
    assert!(doc.institute(7).unwrap().department(9).is_some());
}

#[test]
fn department_delete_cancels_buffered_row() {
    let mut p = projector();
    p.handle(department(9, 5, "Math")).unwrap();
    p.handle(HierarchyChange::DeleteDepartment {
        institute_id: 5,
        department_id: 9,
    })
    .unwrap();
    assert_eq!(p.pending_for(5), 0);

    p.handle(institute(5, 1, "Eng")).unwrap();
    let doc = p.store().university(1).unwrap().unwrap();
    assert!(doc.institute(5).unwrap().departments.is_empty());
}

#[test]
fn institute_reparenting_keeps_single_holder() {
    let mut p = projector();
    p.handle(university(1, "A")).unwrap();
    p.handle(university(2, "B")).unwrap();
    p.handle(institute(5, 1, "Eng")).unwrap();
    p.handle(department(9, 5, "Math")).unwrap();

    p.handle(institute(5, 2, "Engineering")).unwrap();

    let docs = snapshot(&p);
    assert_eq!(holders_of_institute(&docs, 5), vec![2]);
    let moved = docs[1].institute(5).unwrap();
    assert_eq!(moved.name, "Engineering");
    assert_eq!(moved.department(9).unwrap().name, "Math");
}

#[test]
fn institute_into_missing_university_creates_bare_document() {
    let mut p = projector();
    p.handle(institute(5, 3, "Eng")).unwrap();
    let doc = p.store().university(3).unwrap().unwrap();
    assert_eq!(doc.name, None);
    assert_eq!(doc.institutes, vec![Institute::new(5, "Eng")]);

    p.handle(university(3, "Late")).unwrap();
    let doc = p.store().university(3).unwrap().unwrap();
    assert_eq!(doc.name.as_deref(), Some("Late"));
    assert_eq!(doc.institutes.len(), 1);
}

#[test]
fn department_reparenting_keeps_single_holder() {
    let mut p = projector();
    p.handle(institute(5, 1, "Eng")).unwrap();
    p.handle(institute(6, 1, "Sci")).unwrap();
    p.handle(department(9, 5, "Math")).unwrap();

    p.handle(department(9, 6, "Applied Math")).unwrap();

    let doc = p.store().university(1).unwrap().unwrap();
    assert!(doc.institute(5).unwrap().department(9).is_none());
    assert_eq!(
        doc.institute(6).unwrap().department(9).unwrap().name,
        "Applied Math"
    );
}

#[test]
fn delete_then_create_department_leaves_it_present() {
    let mut p = projector();
    p.handle(institute(2, 1, "Sci")).unwrap();
    p.handle(HierarchyChange::DeleteDepartment {
        institute_id: 2,
        department_id: 7,
    })
    .unwrap();
    p.handle(department(7, 2, "CS")).unwrap();

    let doc = p.store().university(1).unwrap().unwrap();
    assert_eq!(doc.institute(2).unwrap().department(7).unwrap().name, "CS");
}

#[test]
fn deletes_are_idempotent() {
    let mut p = projector();
    p.handle(university(1, "A")).unwrap();
    p.handle(institute(5, 1, "Eng")).unwrap();
    p.handle(department(9, 5, "Math")).unwrap();

    for _ in 0..2 {
        p.handle(HierarchyChange::DeleteDepartment {
            institute_id: 5,
            department_id: 9,
        })
        .unwrap();
    }
    assert!(p.store().university(1).unwrap().unwrap().institute(5).unwrap().departments.is_empty());

    for _ in 0..2 {
        p.handle(HierarchyChange::DeleteInstitute {
            university_id: 1,
            institute_id: 5,
        })
        .unwrap();
    }
    assert!(p.store().university(1).unwrap().unwrap().institutes.is_empty());

    for _ in 0..2 {
        p.handle(HierarchyChange::DeleteUniversity { university_id: 1 })
            .unwrap();
    }
    assert!(snapshot(&p).is_empty());
}

/// Document store that fails the next institute push or pull on request
struct FaultyDocuments {
    inner: SqliteDocumentStore,
    fail_push: AtomicBool,
    fail_pull: AtomicBool,
}

impl FaultyDocuments {
    fn new() -> Self {
        Self {
            inner: SqliteDocumentStore::open_in_memory().unwrap(),
            fail_push: AtomicBool::new(false),
            fail_pull: AtomicBool::new(false),
        }
    }

    fn trip(flag: &AtomicBool) -> Result<()> {
        if flag.swap(false, Ordering::SeqCst) {
            return Err(TributaryError::Store("disk I/O error".into()));
        }
        Ok(())
    }
}

impl DocumentStore for FaultyDocuments {
    fn upsert_university(&self, university_id: i64, name: &str) -> Result<()> {
        self.inner.upsert_university(university_id, name)
    }
    fn delete_university(&self, university_id: i64) -> Result<bool> {
        self.inner.delete_university(university_id)
    }
    fn university(&self, university_id: i64) -> Result<Option<University>> {
        self.inner.university(university_id)
    }
    fn universities(&self) -> Result<Vec<University>> {
        self.inner.universities()
    }
    fn find_institute(&self, institute_id: i64) -> Result<Option<(i64, Institute)>> {
        self.inner.find_institute(institute_id)
    }
    fn institute_exists(&self, institute_id: i64) -> Result<bool> {
        self.inner.institute_exists(institute_id)
    }
    fn pull_institute_except(&self, institute_id: i64, keep_university: i64) -> Result<usize> {
        Self::trip(&self.fail_pull)?;
        self.inner.pull_institute_except(institute_id, keep_university)
    }
    fn set_institute_name(
        &self,
        university_id: i64,
        institute_id: i64,
        name: &str,
    ) -> Result<bool> {
        self.inner.set_institute_name(university_id, institute_id, name)
    }
    fn push_institute(&self, university_id: i64, institute: &Institute) -> Result<()> {
        Self::trip(&self.fail_push)?;
        self.inner.push_institute(university_id, institute)
    }
    fn pull_institute(&self, university_id: i64, institute_id: i64) -> Result<bool> {
        self.inner.pull_institute(university_id, institute_id)
    }
    fn pull_department_except(&self, department_id: i64, keep_institute: i64) -> Result<usize> {
        self.inner.pull_department_except(department_id, keep_institute)
    }
    fn update_department(&self, institute_id: i64, department: &Department) -> Result<bool> {
        self.inner.update_department(institute_id, department)
    }
    fn push_department(&self, institute_id: i64, department: &Department) -> Result<bool> {
        self.inner.push_department(institute_id, department)
    }
    fn pull_department(&self, institute_id: i64, department_id: i64) -> Result<bool> {
        self.inner.pull_department(institute_id, department_id)
    }
}

fn faulty_projector() -> (HierarchyProjector<FaultyDocuments>, Arc<FaultyDocuments>) {
    let store = Arc::new(FaultyDocuments::new());
    let mut p = HierarchyProjector::new(store.clone());
    p.handle(university(1, "A")).unwrap();
    p.handle(university(2, "B")).unwrap();
    p.handle(institute(5, 1, "Eng")).unwrap();
    p.handle(department(9, 5, "Math")).unwrap();
    (p, store)
}

fn assert_moved_with_departments(store: &FaultyDocuments) {
    let docs = store.universities().unwrap();
    assert_eq!(holders_of_institute(&docs, 5), vec![2]);
    let moved = store.university(2).unwrap().unwrap();
    let inst = moved.institute(5).unwrap();
    assert_eq!(inst.name, "Engineering");
    assert_eq!(inst.department(9).unwrap().name, "Math");
}

#[test]
fn failed_insert_during_institute_move_is_retried_without_losing_departments() {
    let (mut p, store) = faulty_projector();

    store.fail_push.store(true, Ordering::SeqCst);
    assert!(p.handle(institute(5, 2, "Engineering")).is_err());
    let docs = store.universities().unwrap();
    assert_eq!(holders_of_institute(&docs, 5), vec![1]);

    p.handle(institute(5, 2, "Engineering")).unwrap();
    assert_moved_with_departments(&store);
}

#[test]
fn failed_pull_during_institute_move_is_retried_without_losing_departments() {
    let (mut p, store) = faulty_projector();

    store.fail_pull.store(true, Ordering::SeqCst);
    assert!(p.handle(institute(5, 2, "Engineering")).is_err());
    let docs = store.universities().unwrap();
    assert_eq!(holders_of_institute(&docs, 5), vec![1, 2]);

    p.handle(institute(5, 2, "Engineering")).unwrap();
    assert_moved_with_departments(&store);
}

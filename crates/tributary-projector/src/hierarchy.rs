//! University -> institute -> department documents.

use crate::pending::PendingBuffer;
use crate::projection::{Outcome, Projection};
use crate::router::{Route, Target};
use std::collections::BTreeMap;
use std::sync::Arc;
use tributary_core::{
    error::Result,
    observe,
    types::{DepartmentRow, InstituteRow, UniversityRow},
    Department, DocumentStore, HierarchyChange, Institute, Position,
};

/// Folds hierarchy changes into a [`DocumentStore`]
///
/// Departments that arrive before their institute wait in a buffer keyed by
/// institute id and are re-applied right after that institute is upserted.
/// Only the newest buffered row of a department is kept; applying or
/// deferring a department drops older rows for it under any institute.
pub struct HierarchyProjector<D> {
    store: Arc<D>,
    pending: PendingBuffer<i64, DepartmentRow>,
}

impl<D: DocumentStore> HierarchyProjector<D> {
    pub fn new(store: Arc<D>) -> Self {
        Self {
            store,
            pending: PendingBuffer::new(),
        }
    }

    pub fn store(&self) -> &Arc<D> {
        &self.store
    }

    /// Departments waiting for `institute_id`
    pub fn pending_for(&self, institute_id: i64) -> usize {
        self.pending.pending_for(&institute_id)
    }

    pub fn handle(&mut self, change: HierarchyChange) -> Result<Outcome> {
        self.handle_from(change, None)
    }

    /// Like [`handle`](Self::handle), recording where the change was read
    /// from in case it has to wait
    pub fn handle_from(
        &mut self,
        change: HierarchyChange,
        source: Option<&Position>,
    ) -> Result<Outcome> {
        match change {
            HierarchyChange::UpsertUniversity(row) => self.upsert_university(&row),
            HierarchyChange::DeleteUniversity { university_id } => {
                self.store.delete_university(university_id)?;
                tracing::info!("Deleted university {}", university_id);
                Ok(Outcome::Applied)
            }
            HierarchyChange::UpsertInstitute(row) => self.upsert_institute(&row),
            HierarchyChange::DeleteInstitute {
                university_id,
                institute_id,
            } => {
                self.store.pull_institute(university_id, institute_id)?;
                tracing::info!(
                    "Deleted institute {} from university {}",
                    institute_id,
                    university_id
                );
                Ok(Outcome::Applied)
            }
            HierarchyChange::UpsertDepartment(row) => {
                self.upsert_department(row, source.cloned())
            }
            HierarchyChange::DeleteDepartment {
                institute_id,
                department_id,
            } => {
                self.store.pull_department(institute_id, department_id)?;
                self.drop_superseded(department_id);
                tracing::info!(
                    "Deleted department {} from institute {}",
                    department_id,
                    institute_id
                );
                Ok(Outcome::Applied)
            }
        }
    }

    fn upsert_university(&mut self, row: &UniversityRow) -> Result<Outcome> {
        self.store.upsert_university(row.university_id, &row.name)?;
        tracing::info!("Upserted university {}", row.university_id);
        observe::record_applied("hierarchy", "universities");
        Ok(Outcome::Applied)
    }

    fn upsert_institute(&mut self, row: &InstituteRow) -> Result<Outcome> {
        let (uid, iid) = (row.university_id, row.institute_id);

        // Push into the target before pulling other copies: at every step some
        // university holds the institute with its departments
        if self.store.set_institute_name(uid, iid, &row.name)? {
            tracing::info!("Updated institute {} in university {}", iid, uid);
        } else {
            let institute = match self.store.find_institute(iid)? {
                Some((_, mut captured)) => {
                    captured.name = row.name.clone();
                    captured
                }
                None => Institute::new(iid, row.name.clone()),
            };
            self.store.push_institute(uid, &institute)?;
            tracing::info!("Inserted institute {} into university {}", iid, uid);
        }

        let moved = self.store.pull_institute_except(iid, uid)?;
        if moved > 0 {
            tracing::info!(
                "Removed institute {} from {} other universities",
                iid,
                moved
            );
        }
        observe::record_applied("hierarchy", "institutes");

        self.flush_departments(iid)?;
        Ok(Outcome::Applied)
    }

    fn flush_departments(&mut self, institute_id: i64) -> Result<()> {
        let waiting = self.pending.flush(&institute_id);
        if waiting.is_empty() {
            return Ok(());
        }
        let count = waiting.len();
        let mut queue = waiting.into_iter();
        while let Some(held) = queue.next() {
            if let Err(e) = self.upsert_department(held.record.clone(), held.position.clone()) {
                let mut rest = vec![held];
                rest.extend(queue);
                tracing::error!(
                    "Re-applying buffered department {} failed, {} kept for institute {}: {}",
                    rest[0].record.department_id,
                    rest.len(),
                    institute_id,
                    e
                );
                self.pending.requeue_front(institute_id, rest);
                return Err(e);
            }
        }
        tracing::info!(
            "Flushed {} buffered departments for institute {}",
            count,
            institute_id
        );
        observe::record_flushed("hierarchy", count, self.pending.len());
        Ok(())
    }

    /// Forget buffered rows of `department_id`; a newer change replaces them
    fn drop_superseded(&mut self, department_id: i64) {
        let dropped = self
            .pending
            .retain(|_, row| row.department_id != department_id);
        if dropped > 0 {
            tracing::info!(
                "Dropped {} superseded buffered rows for department {}",
                dropped,
                department_id
            );
        }
    }

    fn upsert_department(
        &mut self,
        row: DepartmentRow,
        source: Option<Position>,
    ) -> Result<Outcome> {
        let (did, iid) = (row.department_id, row.institute_id);

        let moved = self.store.pull_department_except(did, iid)?;
        if moved > 0 {
            tracing::info!("Removed department {} from {} other institutes", did, moved);
        }

        let department = Department {
            department_id: did,
            name: row.name.clone(),
            head: row.head.clone(),
            phone: row.phone.clone(),
        };

        if self.store.update_department(iid, &department)? {
            tracing::info!("Updated department {} in institute {}", did, iid);
        } else if self.store.push_department(iid, &department)? {
            tracing::info!("Inserted department {} into institute {}", did, iid);
        } else {
            self.drop_superseded(did);
            self.pending.defer(iid, row, source);
            tracing::info!("Buffered department {} for future institute {}", did, iid);
            observe::record_deferred("hierarchy", self.pending.len());
            return Ok(Outcome::Deferred);
        }
        self.drop_superseded(did);
        observe::record_applied("hierarchy", "departments");
        Ok(Outcome::Applied)
    }
}

impl<D: DocumentStore> Projection for HierarchyProjector<D> {
    fn target(&self) -> Target {
        Target::Hierarchy
    }

    fn apply(&mut self, route: Route, source: Option<&Position>) -> Result<Outcome> {
        match route {
            Route::Hierarchy(change) => self.handle_from(change, source),
            _ => Ok(Outcome::Ignored),
        }
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }

    fn held_offsets(&self) -> BTreeMap<(String, i32), i64> {
        self.pending.oldest_offsets()
    }
}

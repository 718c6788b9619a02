//! Groups, students, schedules and attendance as a property graph.

use crate::pending::PendingBuffer;
use crate::projection::{Outcome, Projection};
use crate::router::{Route, Target};
use chrono::{Days, NaiveDate};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tributary_core::{
    error::{Result, TributaryError},
    observe,
    types::{AttendanceRow, GroupRow, ScheduleRow, StudentRow},
    Direction, EndpointPolicy, GraphChange, GraphStore, NodeRef, Position, Properties, RelType,
};

/// `start_time` is a day count from the Unix epoch
pub fn schedule_date(start_time: i64) -> Result<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
        .ok_or_else(|| TributaryError::InvalidState("epoch date".into()))?;
    let days = Days::new(start_time.unsigned_abs());
    let date = if start_time >= 0 {
        epoch.checked_add_days(days)
    } else {
        epoch.checked_sub_days(days)
    };
    date.ok_or_else(|| TributaryError::Decode(format!("start_time {} out of range", start_time)))
}

fn properties(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}

/// Folds academic-activity changes into a [`GraphStore`]
///
/// Attendance for a student that has not arrived yet waits in a buffer keyed
/// by student id and is re-applied right after that student is upserted.
/// At most one record per (student, schedule) pair waits: a newer change
/// for the pair replaces or cancels it.
pub struct GraphProjector<G> {
    store: Arc<G>,
    pending: PendingBuffer<i64, AttendanceRow>,
}

impl<G: GraphStore> GraphProjector<G> {
    pub fn new(store: Arc<G>) -> Self {
        Self {
            store,
            pending: PendingBuffer::new(),
        }
    }

    pub fn store(&self) -> &Arc<G> {
        &self.store
    }

    /// Attendance records waiting for `student_id`
    pub fn pending_for(&self, student_id: i64) -> usize {
        self.pending.pending_for(&student_id)
    }

    pub fn handle(&mut self, change: GraphChange) -> Result<Outcome> {
        self.handle_from(change, None)
    }

    /// Like [`handle`](Self::handle), recording where the change was read
    /// from in case it has to wait
    pub fn handle_from(
        &mut self,
        change: GraphChange,
        source: Option<&Position>,
    ) -> Result<Outcome> {
        match change {
            GraphChange::UpsertGroup(row) => self.upsert_group(&row),
            GraphChange::DeleteGroup { group_id } => {
                self.store.detach_delete(NodeRef::group(group_id))?;
                tracing::info!("Group deleted: {}", group_id);
                Ok(Outcome::Applied)
            }
            GraphChange::UpsertStudent(row) => self.upsert_student(&row),
            GraphChange::DeleteStudent { student_id } => {
                self.store.detach_delete(NodeRef::student(student_id))?;
                tracing::info!("Student deleted: {}", student_id);
                Ok(Outcome::Applied)
            }
            GraphChange::UpsertSchedule(row) => self.upsert_schedule(&row),
            GraphChange::DeleteSchedule { schedule_id } => {
                self.store.detach_delete(NodeRef::schedule(schedule_id))?;
                tracing::info!("Schedule deleted: {}", schedule_id);
                Ok(Outcome::Applied)
            }
            GraphChange::Attendance(row) => self.attendance(row, source.cloned()),
            GraphChange::DeleteAttendance {
                student_id,
                schedule_id,
            } => {
                self.drop_superseded(student_id, schedule_id);
                self.store.delete_edge(
                    RelType::Attended,
                    NodeRef::student(student_id),
                    NodeRef::schedule(schedule_id),
                )?;
                tracing::info!(
                    "Attendance deleted: student={} -> schedule={}",
                    student_id,
                    schedule_id
                );
                Ok(Outcome::Applied)
            }
        }
    }

    fn upsert_group(&mut self, row: &GroupRow) -> Result<Outcome> {
        self.store.merge_node(
            NodeRef::group(row.group_id),
            &properties(json!({ "code": row.name })),
        )?;
        tracing::info!("Group upserted: {}", row.group_id);
        observe::record_applied("graph", "groups");
        Ok(Outcome::Applied)
    }

    fn upsert_student(&mut self, row: &StudentRow) -> Result<Outcome> {
        let student = NodeRef::student(row.student_id);
        let group = NodeRef::group(row.group_id);

        self.store.merge_node(
            student,
            &properties(json!({ "name": row.full_name })),
        )?;
        let moved =
            self.store
                .delete_edges_except(RelType::BelongsTo, student, Direction::Outgoing, group)?;
        if moved > 0 {
            tracing::info!("Student {} left {} previous groups", row.student_id, moved);
        }
        // stub group if it has not arrived yet
        self.store
            .merge_edge(RelType::BelongsTo, student, group, EndpointPolicy::CreateStubs)?;
        tracing::info!("Student upserted: {}", row.student_id);
        observe::record_applied("graph", "students");

        self.flush_attendance(row.student_id)?;
        Ok(Outcome::Applied)
    }

    fn flush_attendance(&mut self, student_id: i64) -> Result<()> {
        let waiting = self.pending.flush(&student_id);
        if waiting.is_empty() {
            return Ok(());
        }
        let count = waiting.len();
        let mut queue = waiting.into_iter();
        while let Some(held) = queue.next() {
            if let Err(e) = self.attendance(held.record.clone(), held.position.clone()) {
                let mut rest = vec![held];
                rest.extend(queue);
                tracing::error!(
                    "Re-applying buffered attendance failed, {} kept for student {}: {}",
                    rest.len(),
                    student_id,
                    e
                );
                self.pending.requeue_front(student_id, rest);
                return Err(e);
            }
        }
        tracing::info!(
            "Flushed {} buffered attendances for student={}",
            count,
            student_id
        );
        observe::record_flushed("graph", count, self.pending.len());
        Ok(())
    }

    fn upsert_schedule(&mut self, row: &ScheduleRow) -> Result<Outcome> {
        let schedule = NodeRef::schedule(row.schedule_id);
        let group = NodeRef::group(row.group_id);
        let date = schedule_date(row.start_time)?;

        self.store.merge_node(
            schedule,
            &properties(json!({
                "title": row.title,
                "date": date.format("%Y-%m-%d").to_string(),
                "duration": row.duration,
                "course_id": row.course_id,
                "course_title": row.course_title,
                "tag": row.tag,
            })),
        )?;
        self.store
            .delete_edges_except(RelType::HasSchedule, schedule, Direction::Incoming, group)?;
        self.store
            .merge_edge(RelType::HasSchedule, group, schedule, EndpointPolicy::CreateStubs)?;
        tracing::info!("Schedule upserted: {}", row.schedule_id);
        observe::record_applied("graph", "schedules");
        Ok(Outcome::Applied)
    }

    /// Forget buffered attendance for one pair; a newer change replaces it
    fn drop_superseded(&mut self, student_id: i64, schedule_id: i64) {
        let dropped = self
            .pending
            .retain(|_, row| !(row.student_id == student_id && row.schedule_id == schedule_id));
        if dropped > 0 {
            tracing::info!(
                "Dropped {} superseded buffered attendances for student={} -> schedule={}",
                dropped,
                student_id,
                schedule_id
            );
        }
    }

    fn attendance(&mut self, row: AttendanceRow, source: Option<Position>) -> Result<Outcome> {
        let student = NodeRef::student(row.student_id);
        let schedule = NodeRef::schedule(row.schedule_id);
        self.drop_superseded(row.student_id, row.schedule_id);

        if !row.attended() {
            self.store.delete_edge(RelType::Attended, student, schedule)?;
            tracing::info!(
                "Attendance removed (presence=false): student={} -> schedule={}",
                row.student_id,
                row.schedule_id
            );
            observe::record_applied("graph", "attendances");
            return Ok(Outcome::Applied);
        }

        if !self.store.node_exists(student)? {
            tracing::info!(
                "Buffered attendance for student={} -> schedule={}",
                row.student_id,
                row.schedule_id
            );
            self.pending.defer(row.student_id, row, source);
            observe::record_deferred("graph", self.pending.len());
            return Ok(Outcome::Deferred);
        }

        // schedule and attendance topics interleave, so the schedule may be a stub
        self.store
            .merge_edge(RelType::Attended, student, schedule, EndpointPolicy::CreateStubs)?;
        tracing::info!(
            "Attendance upserted: student={} -> schedule={}",
            row.student_id,
            row.schedule_id
        );
        observe::record_applied("graph", "attendances");
        Ok(Outcome::Applied)
    }
}

impl<G: GraphStore> Projection for GraphProjector<G> {
    fn target(&self) -> Target {
        Target::Graph
    }

    fn apply(&mut self, route: Route, source: Option<&Position>) -> Result<Outcome> {
        match route {
            Route::Graph(change) => self.handle_from(change, source),
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

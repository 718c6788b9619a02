//! Runner loop over a file change log: commit-after-apply, skips, retries,
//! dead letters and shutdown

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tributary_core::{
    error::{Result, TributaryError},
    ChangeStream, Direction, EndpointPolicy, GraphStore, LogConfig, NodeRef, Properties,
    RelType, RetryConfig, RunnerConfig,
};
use tributary_log::{FileChangeLog, LogConsumer};
use tributary_projector::{GraphProjector, ProjectionRunner, Target};
use tributary_sqlite::{connection, DeadLetterQueue, SqliteGraphStore};

const PREFIX: &str = "university_db.public";

fn topic(table: &str) -> String {
    format!("{}.{}", PREFIX, table)
}

fn create_test_log() -> (FileChangeLog, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let log = FileChangeLog::open(LogConfig::new(temp_dir.path().join("log"))).unwrap();
    (log, temp_dir)
}

fn publish(log: &FileChangeLog, table: &str, value: Option<Value>) -> i64 {
    let bytes = value.map(|v| serde_json::to_vec(&v).unwrap());
    log.append(&topic(table), 0, None, bytes.as_deref()).unwrap()
}

fn upsert(after: Value) -> Option<Value> {
    Some(json!({"op": "c", "before": null, "after": after}))
}

const GROUP: &str = "neo4j_hierarchy_group";

fn subscribe(log: &FileChangeLog) -> LogConsumer {
    log.subscribe(GROUP, &Target::Graph.topics(PREFIX)).unwrap()
}

/// Next offset the group resumes `table` from after a restart
fn committed(log: &FileChangeLog, table: &str) -> Option<i64> {
    log.committed_offsets(GROUP)
        .unwrap()
        .get(&format!("{}:0", topic(table)))
        .copied()
}

fn fast_config(max_retries: usize) -> RunnerConfig {
    RunnerConfig::default()
        .with_poll_interval_ms(1)
        .with_retry(RetryConfig::none().with_max_retries(max_retries))
}

/// Graph store whose node merges fail a configurable number of times
struct FlakyGraph {
    inner: SqliteGraphStore,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyGraph {
    fn new(failures: usize) -> Self {
        Self {
            inner: SqliteGraphStore::open_in_memory().unwrap(),
            failures_left: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }
}

impl GraphStore for FlakyGraph {
    fn merge_node(&self, node: NodeRef, props: &Properties) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(TributaryError::Store("connection reset".into()));
        }
        self.inner.merge_node(node, props)
    }
    fn node(&self, node: NodeRef) -> Result<Option<Properties>> {
        self.inner.node(node)
    }
    fn node_exists(&self, node: NodeRef) -> Result<bool> {
        self.inner.node_exists(node)
    }
    fn detach_delete(&self, node: NodeRef) -> Result<bool> {
        self.inner.detach_delete(node)
    }
    fn merge_edge(
        &self,
        rel: RelType,
        from: NodeRef,
        to: NodeRef,
        policy: EndpointPolicy,
    ) -> Result<bool> {
        self.inner.merge_edge(rel, from, to, policy)
    }
    fn delete_edge(&self, rel: RelType, from: NodeRef, to: NodeRef) -> Result<bool> {
        self.inner.delete_edge(rel, from, to)
    }
    fn delete_edges_except(
        &self,
        rel: RelType,
        node: NodeRef,
        direction: Direction,
        keep: NodeRef,
    ) -> Result<usize> {
        self.inner.delete_edges_except(rel, node, direction, keep)
    }
    fn edge_count(&self, rel: RelType, from: NodeRef, to: NodeRef) -> Result<usize> {
        self.inner.edge_count(rel, from, to)
    }
    fn edges(&self, rel: RelType) -> Result<Vec<(NodeRef, NodeRef)>> {
        self.inner.edges(rel)
    }
}

#[tokio::test]
async fn orphan_attendance_becomes_one_edge_once_student_arrives() {
    let (log, _temp) = create_test_log();
    let graph = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
    let mut runner = ProjectionRunner::new(
        subscribe(&log),
        GraphProjector::new(graph.clone()),
        fast_config(0),
    );
    let edge = || {
        graph
            .edge_count(RelType::Attended, NodeRef::student(3), NodeRef::schedule(10))
            .unwrap()
    };

    publish(
        &log,
        "attendances",
        upsert(json!({"student_id": 3, "shedule_id": 10, "presence": true})),
    );
    let stats = runner.run_until_idle().await.unwrap();
    assert_eq!(stats.deferred, 1);
    assert_eq!(edge(), 0);
    assert_eq!(runner.projection().pending_for(3), 1);

    publish(
        &log,
        "students",
        upsert(json!({"student_id": 3, "group_id": 1, "full_name": "A"})),
    );
    let stats = runner.run_until_idle().await.unwrap();
    assert_eq!(stats.applied, 1);
    assert_eq!(edge(), 1);
}

#[tokio::test]
async fn offsets_are_committed_after_each_message() {
    let (log, _temp) = create_test_log();
    let graph = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
    for id in 0..3 {
        publish(&log, "groups", upsert(json!({"group_id": id, "name": "G"})));
    }

    let mut runner = ProjectionRunner::new(
        subscribe(&log),
        GraphProjector::new(graph),
        fast_config(0),
    );
    let stats = runner.run_until_idle().await.unwrap();
    assert_eq!(stats.applied, 3);
    assert_eq!(stats.committed_to.unwrap().offset, 2);
    assert_eq!(committed(&log, "groups"), Some(3));

    let mut again = subscribe(&log);
    assert!(again.poll(10).unwrap().is_empty());
}

#[tokio::test]
async fn garbage_tombstones_and_foreign_tables_are_skipped_and_committed() {
    let (log, _temp) = create_test_log();
    let graph = Arc::new(SqliteGraphStore::open_in_memory().unwrap());

    publish(&log, "groups", None);
    publish(&log, "groups", Some(json!({"before": null, "after": {}})));
    publish(&log, "groups", Some(json!({"op": "x", "after": {}})));
    publish(&log, "groups", upsert(json!({"group_id": "not a number"})));
    log.append(&topic("groups"), 0, None, Some(b"{oops")).unwrap();
    publish(&log, "groups", upsert(json!({"group_id": 1, "name": "G"})));

    let mut runner = ProjectionRunner::new(
        subscribe(&log),
        GraphProjector::new(graph.clone()),
        fast_config(0),
    );
    let stats = runner.run_until_idle().await.unwrap();
    assert_eq!(stats.skipped, 5);
    assert_eq!(stats.applied, 1);
    assert!(graph.node_exists(NodeRef::group(1)).unwrap());
    assert_eq!(committed(&log, "groups"), Some(6));
}

#[tokio::test]
async fn transient_store_failures_are_retried() {
    let (log, _temp) = create_test_log();
    let graph = Arc::new(FlakyGraph::new(2));
    publish(&log, "groups", upsert(json!({"group_id": 1, "name": "G"})));

    let mut runner = ProjectionRunner::new(
        subscribe(&log),
        GraphProjector::new(graph.clone()),
        fast_config(3),
    );
    let stats = runner.run_until_idle().await.unwrap();
    assert_eq!(stats.applied, 1);
    assert_eq!(stats.dead_lettered, 0);
    assert_eq!(graph.attempts.load(Ordering::SeqCst), 3);
    assert!(graph.node_exists(NodeRef::group(1)).unwrap());
}

#[tokio::test]
async fn poison_message_goes_to_dead_letter_queue() {
    let (log, _temp) = create_test_log();
    let graph = Arc::new(FlakyGraph::new(2));
    let dlq = Arc::new(DeadLetterQueue::new(connection::open_in_memory().unwrap()).unwrap());
    publish(&log, "groups", upsert(json!({"group_id": 1, "name": "G"})));
    publish(&log, "groups", upsert(json!({"group_id": 2, "name": "H"})));

    let mut runner = ProjectionRunner::new(
        subscribe(&log),
        GraphProjector::new(graph.clone()),
        fast_config(1),
    )
    .with_dead_letters(dlq.clone());
    let stats = runner.run_until_idle().await.unwrap();

    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(stats.applied, 1);
    assert!(!graph.node_exists(NodeRef::group(1)).unwrap());
    assert!(graph.node_exists(NodeRef::group(2)).unwrap());
    assert_eq!(committed(&log, "groups"), Some(2));

    let letters = dlq.list(10).unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].offset, 0);
    assert_eq!(letters[0].attempts, 2);
    assert!(letters[0].error_message.contains("connection reset"));

    // replay once the store has recovered
    let mut projector = GraphProjector::new(graph.clone());
    tributary_projector::replay(&mut projector, &letters[0].message()).unwrap();
    assert!(graph.node_exists(NodeRef::group(1)).unwrap());
}

#[tokio::test]
async fn failure_without_dead_letter_queue_leaves_offset_uncommitted() {
    let (log, _temp) = create_test_log();
    publish(&log, "groups", upsert(json!({"group_id": 1, "name": "G"})));

    let mut runner = ProjectionRunner::new(
        subscribe(&log),
        GraphProjector::new(Arc::new(FlakyGraph::new(usize::MAX))),
        fast_config(1),
    );
    let err = runner.run_once().await.unwrap_err();
    assert!(matches!(err, TributaryError::Store(_)));
    assert_eq!(committed(&log, "groups"), None);

    // redelivered to the next runner of the same group
    let graph = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
    let mut runner = ProjectionRunner::new(
        subscribe(&log),
        GraphProjector::new(graph.clone()),
        fast_config(0),
    );
    runner.run_until_idle().await.unwrap();
    assert!(graph.node_exists(NodeRef::group(1)).unwrap());
}

#[tokio::test]
async fn shutdown_stops_before_next_message() {
    let (log, _temp) = create_test_log();
    publish(&log, "groups", upsert(json!({"group_id": 1, "name": "G"})));

    let graph = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
    let mut runner = ProjectionRunner::new(
        subscribe(&log),
        GraphProjector::new(graph.clone()),
        fast_config(0),
    );
    let handle = runner.shutdown_handle();
    handle.shutdown();
    assert!(handle.is_shutdown());

    let stats = runner.run_once().await.unwrap();
    assert_eq!(stats.polled, 1);
    assert_eq!(stats.applied, 0);
    assert_eq!(stats.committed_to, None);
    assert!(!graph.node_exists(NodeRef::group(1)).unwrap());

    let totals = runner.run().await.unwrap();
    assert_eq!(totals.applied, 0);
}

#[tokio::test]
async fn run_loop_stops_on_shutdown_from_another_task() {
    let (log, _temp) = create_test_log();
    publish(&log, "groups", upsert(json!({"group_id": 1, "name": "G"})));

    let graph = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
    let mut runner = ProjectionRunner::new(
        subscribe(&log),
        GraphProjector::new(graph.clone()),
        fast_config(0),
    );
    let handle = runner.shutdown_handle();
    let task = tokio::spawn(async move { runner.run().await });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    handle.shutdown();
    let totals = task.await.unwrap().unwrap();

    assert_eq!(totals.applied, 1);
    assert!(graph.node_exists(NodeRef::group(1)).unwrap());
}

#[tokio::test]
async fn buffered_message_holds_back_its_partition_commit() {
    let (log, _temp) = create_test_log();
    let graph = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
    publish(
        &log,
        "attendances",
        upsert(json!({"student_id": 3, "shedule_id": 10, "presence": true})),
    );
    publish(&log, "groups", upsert(json!({"group_id": 1, "name": "G"})));

    {
        let mut runner = ProjectionRunner::new(
            subscribe(&log),
            GraphProjector::new(graph.clone()),
            fast_config(0),
        );
        let stats = runner.run_until_idle().await.unwrap();
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.applied, 1);
    }
    assert_eq!(committed(&log, "attendances"), None);
    assert_eq!(committed(&log, "groups"), Some(1));

    // same group after a restart: the buffered attendance comes back
    let mut runner = ProjectionRunner::new(
        subscribe(&log),
        GraphProjector::new(graph.clone()),
        fast_config(0),
    );
    let stats = runner.run_until_idle().await.unwrap();
    assert_eq!(stats.polled, 1);
    assert_eq!(stats.deferred, 1);

    publish(
        &log,
        "students",
        upsert(json!({"student_id": 3, "group_id": 1, "full_name": "A"})),
    );
    runner.run_until_idle().await.unwrap();
    assert_eq!(
        graph
            .edge_count(RelType::Attended, NodeRef::student(3), NodeRef::schedule(10))
            .unwrap(),
        1
    );
    assert_eq!(committed(&log, "attendances"), Some(1));
    assert_eq!(committed(&log, "students"), Some(1));
}

#[tokio::test]
async fn rewind_does_not_buffer_a_message_twice() {
    let (log, _temp) = create_test_log();
    publish(
        &log,
        "attendances",
        upsert(json!({"student_id": 3, "shedule_id": 10, "presence": true})),
    );
    publish(&log, "groups", upsert(json!({"group_id": 1, "name": "G"})));

    let graph = Arc::new(FlakyGraph::new(1));
    let mut runner = ProjectionRunner::new(
        subscribe(&log),
        GraphProjector::new(graph.clone()),
        fast_config(0),
    );
    assert!(runner.run_once().await.is_err());

    runner.run_until_idle().await.unwrap();
    assert!(graph.node_exists(NodeRef::group(1)).unwrap());
    assert_eq!(runner.projection().pending_for(3), 1);
    assert_eq!(committed(&log, "groups"), Some(1));
    assert_eq!(committed(&log, "attendances"), None);
}

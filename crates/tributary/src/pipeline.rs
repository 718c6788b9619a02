//! Unified pipeline interface
//!
//! Bundles the change log, both target stores and their dead-letter queues,
//! and hands out runners wired to them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tributary_core::{LogConfig, Result, RunnerConfig, StoreConfig};
use tributary_log::{FileChangeLog, LogConsumer};
use tributary_projector::{GraphProjector, HierarchyProjector, ProjectionRunner, Table, Target};
use tributary_sqlite::{DeadLetterQueue, SqliteDocumentStore, SqliteGraphStore};

pub type HierarchyRunner = ProjectionRunner<LogConsumer, HierarchyProjector<SqliteDocumentStore>>;
pub type GraphRunner = ProjectionRunner<LogConsumer, GraphProjector<SqliteGraphStore>>;

/// Where everything lives and how the loops behave
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub log: LogConfig,
    pub hierarchy_store: StoreConfig,
    pub graph_store: StoreConfig,

    /// Default: `university_hierarchy_group`
    #[serde(default = "default_hierarchy_group")]
    pub hierarchy_group: String,

    /// Default: `neo4j_hierarchy_group`
    #[serde(default = "default_graph_group")]
    pub graph_group: String,

    /// Topics are `{topic_prefix}.{table}`
    /// Default: `university_db.public`
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    #[serde(default)]
    pub runner: RunnerConfig,
}

fn default_hierarchy_group() -> String {
    "university_hierarchy_group".into()
}

fn default_graph_group() -> String {
    "neo4j_hierarchy_group".into()
}

fn default_topic_prefix() -> String {
    "university_db.public".into()
}

impl PipelineConfig {
    /// Lay everything out under one directory:
    /// - `{path}/log/` - change log and group offsets
    /// - `{path}/hierarchy.db` - university documents and their DLQ
    /// - `{path}/graph.db` - graph and its DLQ
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let base = path.as_ref();
        Self {
            log: LogConfig::new(base.join("log")),
            hierarchy_store: StoreConfig::new(base.join("hierarchy.db")),
            graph_store: StoreConfig::new(base.join("graph.db")),
            hierarchy_group: default_hierarchy_group(),
            graph_group: default_graph_group(),
            topic_prefix: default_topic_prefix(),
            runner: RunnerConfig::default(),
        }
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log = LogConfig::new(dir);
        self
    }

    pub fn with_hierarchy_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.hierarchy_store = StoreConfig::new(path);
        self
    }

    pub fn with_graph_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.graph_store = StoreConfig::new(path);
        self
    }

    pub fn with_group(mut self, target: Target, group: impl Into<String>) -> Self {
        match target {
            Target::Hierarchy => self.hierarchy_group = group.into(),
            Target::Graph => self.graph_group = group.into(),
        }
        self
    }

    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    pub fn with_runner(mut self, runner: RunnerConfig) -> Self {
        self.runner = runner;
        self
    }

    pub fn group(&self, target: Target) -> &str {
        match target {
            Target::Hierarchy => &self.hierarchy_group,
            Target::Graph => &self.graph_group,
        }
    }

    pub fn topic(&self, table: Table) -> String {
        format!("{}.{}", self.topic_prefix, table.name())
    }
}

/// Change log plus both target stores
///
/// Each store must be driven by a single runner at a time: the pending
/// buffers live in the runner's projector, not in the store.
pub struct Pipeline {
    config: PipelineConfig,
    log: Arc<FileChangeLog>,
    documents: Arc<SqliteDocumentStore>,
    graph: Arc<SqliteGraphStore>,
    hierarchy_dlq: Arc<DeadLetterQueue>,
    graph_dlq: Arc<DeadLetterQueue>,
}

impl Pipeline {
    /// Open a pipeline with the default layout under `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(PipelineConfig::new(path))
    }

    pub fn open_with_config(config: PipelineConfig) -> Result<Self> {
        let log = Arc::new(FileChangeLog::open(config.log.clone())?);

        let documents = Arc::new(SqliteDocumentStore::open(&config.hierarchy_store)?);
        let hierarchy_dlq = Arc::new(DeadLetterQueue::new(documents.conn().clone())?);

        let graph = Arc::new(SqliteGraphStore::open(&config.graph_store)?);
        let graph_dlq = Arc::new(DeadLetterQueue::new(graph.conn().clone())?);

        tracing::info!(
            "Opened pipeline (log: {}, hierarchy: {}, graph: {})",
            config.log.base_dir.display(),
            config.hierarchy_store.path.display(),
            config.graph_store.path.display()
        );

        Ok(Self {
            config,
            log,
            documents,
            graph,
            hierarchy_dlq,
            graph_dlq,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<FileChangeLog> {
        &self.log
    }

    pub fn documents(&self) -> &Arc<SqliteDocumentStore> {
        &self.documents
    }

    pub fn graph(&self) -> &Arc<SqliteGraphStore> {
        &self.graph
    }

    pub fn dead_letters(&self, target: Target) -> &Arc<DeadLetterQueue> {
        match target {
            Target::Hierarchy => &self.hierarchy_dlq,
            Target::Graph => &self.graph_dlq,
        }
    }

    /// Append a raw envelope for `table` to partition 0. `None` is a tombstone.
    pub fn publish(&self, table: Table, value: Option<&serde_json::Value>) -> Result<i64> {
        let bytes = value.map(serde_json::to_vec).transpose()?;
        self.log
            .append(&self.config.topic(table), 0, None, bytes.as_deref())
    }

    /// Subscribe `target`'s consumer group to its topics
    pub fn subscribe(&self, target: Target) -> Result<LogConsumer> {
        self.log.subscribe(
            self.config.group(target),
            &target.topics(&self.config.topic_prefix),
        )
    }

    pub fn hierarchy_runner(&self) -> Result<HierarchyRunner> {
        Ok(ProjectionRunner::new(
            self.subscribe(Target::Hierarchy)?,
            HierarchyProjector::new(self.documents.clone()),
            self.config.runner.clone(),
        )
        .with_dead_letters(self.hierarchy_dlq.clone()))
    }

    pub fn graph_runner(&self) -> Result<GraphRunner> {
        Ok(ProjectionRunner::new(
            self.subscribe(Target::Graph)?,
            GraphProjector::new(self.graph.clone()),
            self.config.runner.clone(),
        )
        .with_dead_letters(self.graph_dlq.clone()))
    }
}

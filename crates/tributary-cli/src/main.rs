//! Tributary CLI - publish change dumps, run projections, inspect state

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tributary::{PipelineConfig, RetryConfig, RunnerConfig, Target};

mod commands;

#[derive(Parser)]
#[command(name = "tributary")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding the change log and both stores
    #[arg(short, long, env = "TRIBUTARY_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Change log directory (default: {data_dir}/log)
    #[arg(long, env = "TRIBUTARY_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Hierarchy document store (default: {data_dir}/hierarchy.db)
    #[arg(long, env = "TRIBUTARY_HIERARCHY_DB")]
    hierarchy_db: Option<PathBuf>,

    /// Graph store (default: {data_dir}/graph.db)
    #[arg(long, env = "TRIBUTARY_GRAPH_DB")]
    graph_db: Option<PathBuf>,

    /// Topic prefix; topics are {prefix}.{table}
    #[arg(long, env = "TRIBUTARY_TOPIC_PREFIX", default_value = "university_db.public")]
    topic_prefix: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum TargetArg {
    Hierarchy,
    Graph,
}

impl From<TargetArg> for Target {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Hierarchy => Target::Hierarchy,
            TargetArg::Graph => Target::Graph,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Append a JSON-lines dump of CDC envelopes to a topic
    Publish {
        /// Full topic name, e.g. university_db.public.departments
        #[arg(short, long)]
        topic: String,

        #[arg(short, long, default_value_t = 0)]
        partition: i32,

        /// One envelope per line; `null` lines are tombstones
        file: PathBuf,
    },

    /// Run a projection loop until Ctrl-C
    Run {
        #[arg(value_enum)]
        target: TargetArg,

        /// Stop once the stream is drained
        #[arg(long)]
        once: bool,

        /// Consumer group (default depends on the target)
        #[arg(short, long, env = "TRIBUTARY_GROUP")]
        group: Option<String>,

        /// Retries per message before it is dead-lettered
        #[arg(long, default_value_t = 5)]
        max_retries: usize,

        /// Messages per poll
        #[arg(long, default_value_t = 100)]
        batch_max: usize,
    },

    /// Committed offsets, lag and dead-letter counts
    Status,

    /// Dead-letter queue management
    Dlq {
        #[arg(value_enum)]
        target: TargetArg,

        #[command(subcommand)]
        command: DlqCommands,
    },

    /// Print projected state as JSON
    #[command(subcommand)]
    Show(ShowCommands),
}

#[derive(Subcommand)]
pub enum DlqCommands {
    /// List dead letters, oldest first
    List {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Number of dead letters
    Count,

    /// Remove every dead letter
    Clear,

    /// Re-apply dead letters and remove the ones that now succeed
    Replay {
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum ShowCommands {
    /// One university document
    University { id: i64 },

    /// Every node and relationship of the graph
    Graph,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config =
            PipelineConfig::new(&self.data_dir).with_topic_prefix(self.topic_prefix.clone());
        if let Some(dir) = &self.log_dir {
            config = config.with_log_dir(dir);
        }
        if let Some(path) = &self.hierarchy_db {
            config = config.with_hierarchy_store(path);
        }
        if let Some(path) = &self.graph_db {
            config = config.with_graph_store(path);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = cli.pipeline_config();

    // Execute command
    match cli.command {
        Commands::Publish {
            topic,
            partition,
            file,
        } => {
            commands::publish::execute(&config, &topic, partition, &file)?;
        }
        Commands::Run {
            target,
            once,
            group,
            max_retries,
            batch_max,
        } => {
            let target = Target::from(target);
            let mut config = config.with_runner(
                RunnerConfig::default()
                    .with_batch_max(batch_max)
                    .with_retry(RetryConfig::default().with_max_retries(max_retries)),
            );
            if let Some(group) = group {
                config = config.with_group(target, group);
            }
            commands::run::execute(config, target, once).await?;
        }
        Commands::Status => {
            commands::status::execute(&config)?;
        }
        Commands::Dlq { target, command } => {
            commands::dlq::execute(config, target.into(), command)?;
        }
        Commands::Show(command) => {
            commands::show::execute(config, command)?;
        }
    }

    Ok(())
}

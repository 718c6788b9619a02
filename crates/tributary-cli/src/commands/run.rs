//! Run command implementation

use anyhow::{Context, Result};
use tributary::prelude::*;

pub async fn execute(config: PipelineConfig, target: Target, once: bool) -> Result<()> {
    let pipeline = Pipeline::open_with_config(config).context("Failed to open pipeline")?;

    let totals = match target {
        Target::Hierarchy => {
            let runner = pipeline
                .hierarchy_runner()
                .context("Failed to start hierarchy runner")?;
            drive(runner, once).await?
        }
        Target::Graph => {
            let runner = pipeline
                .graph_runner()
                .context("Failed to start graph runner")?;
            drive(runner, once).await?
        }
    };

    println!(
        "✓ {}: polled {}, applied {}, deferred {}, skipped {}, dead-lettered {}",
        target,
        totals.polled,
        totals.applied,
        totals.deferred,
        totals.skipped,
        totals.dead_lettered
    );
    if let Some(position) = totals.committed_to {
        println!("  Last committed: {}", position);
    }
    Ok(())
}

async fn drive<S, P>(mut runner: ProjectionRunner<S, P>, once: bool) -> Result<RunStats>
where
    S: ChangeStream,
    P: Projection,
{
    if once {
        println!("Running projection until the stream is drained...");
        return runner.run_until_idle().await.context("Projection failed");
    }

    println!("Running projection continuously... (Press Ctrl+C to stop)");
    let handle = runner.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping after the current message");
            handle.shutdown();
        }
    });

    runner.run().await.context("Projection failed")
}

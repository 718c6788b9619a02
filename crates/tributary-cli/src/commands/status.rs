//! Status command implementation

use anyhow::{Context, Result};
use tributary::prelude::*;

pub fn execute(config: &PipelineConfig) -> Result<()> {
    let pipeline = Pipeline::open_with_config(config.clone()).context("Failed to open pipeline")?;
    let log = pipeline.log();

    println!("\nPipeline Status");
    println!("{}", "=".repeat(60));
    println!("Change log: {}", config.log.base_dir.display());
    println!("Hierarchy store: {}", config.hierarchy_store.path.display());
    println!("Graph store: {}", config.graph_store.path.display());

    println!("\nTopics:");
    let topics = log.topics().context("Failed to list topics")?;
    if topics.is_empty() {
        println!("  (none)");
    }
    for topic in &topics {
        for partition in log.partitions(topic)? {
            println!(
                "  {}[{}]: {} messages",
                topic,
                partition,
                log.end_offset(topic, partition)?
            );
        }
    }

    println!("\nConsumer groups:");
    let groups = log.groups().context("Failed to list consumer groups")?;
    if groups.is_empty() {
        println!("  (none)");
    }
    for group in &groups {
        println!("  {}", group);
        for (slot, next) in log.committed_offsets(group)? {
            let lag = match slot.rsplit_once(':') {
                Some((topic, partition)) => partition
                    .parse::<i32>()
                    .ok()
                    .and_then(|p| log.end_offset(topic, p).ok())
                    .map(|end| (end - next).max(0)),
                None => None,
            };
            match lag {
                Some(lag) => println!("    {}: next offset {}, lag {}", slot, next, lag),
                None => println!("    {}: next offset {}", slot, next),
            }
        }
    }

    println!("\nDead letters:");
    for target in [Target::Hierarchy, Target::Graph] {
        println!(
            "  {}: {}",
            target,
            pipeline.dead_letters(target).count()?
        );
    }

    println!("\nBuffered children are process-local and not shown.");
    Ok(())
}

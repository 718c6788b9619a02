//! Publish command implementation

use anyhow::{bail, Context, Result};
use std::path::Path;
use tributary::{FileChangeLog, PipelineConfig};

pub fn execute(config: &PipelineConfig, topic: &str, partition: i32, file: &Path) -> Result<()> {
    let log = FileChangeLog::open(config.log.clone()).context("Failed to open change log")?;
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut published = 0;
    let mut tombstones = 0;
    let mut last = None;
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => bail!("{}:{}: not JSON: {}", file.display(), n + 1, e),
        };
        let offset = if value.is_null() {
            tombstones += 1;
            log.append(topic, partition, None, None)?
        } else {
            log.append(topic, partition, None, Some(line.as_bytes()))?
        };
        published += 1;
        last = Some(offset);
    }

    match last {
        Some(offset) => println!(
            "✓ Published {} messages ({} tombstones) to {}[{}], last offset {}",
            published, tombstones, topic, partition, offset
        ),
        None => println!("Nothing to publish in {}", file.display()),
    }
    Ok(())
}

//! Dead-letter queue commands

use crate::DlqCommands;
use anyhow::{Context, Result};
use tributary::prelude::*;
use tributary::{replay, DeadLetter, Outcome};

pub fn execute(config: PipelineConfig, target: Target, command: DlqCommands) -> Result<()> {
    let pipeline = Pipeline::open_with_config(config).context("Failed to open pipeline")?;
    let dlq = pipeline.dead_letters(target);

    match command {
        DlqCommands::List { limit } => {
            let letters = dlq.list(limit).context("Failed to list dead letters")?;
            if letters.is_empty() {
                println!("No dead letters for {}", target);
            }
            for letter in letters {
                print_letter(&letter);
            }
        }
        DlqCommands::Count => {
            println!("{}", dlq.count()?);
        }
        DlqCommands::Clear => {
            let removed = dlq.clear()?;
            println!("✓ Removed {} dead letters", removed);
        }
        DlqCommands::Replay { limit } => {
            let letters = dlq.list(limit).context("Failed to list dead letters")?;
            let (replayed, failed) = match target {
                Target::Hierarchy => {
                    let mut projector = HierarchyProjector::new(pipeline.documents().clone());
                    replay_all(&mut projector, dlq, &letters)?
                }
                Target::Graph => {
                    let mut projector = GraphProjector::new(pipeline.graph().clone());
                    replay_all(&mut projector, dlq, &letters)?
                }
            };
            println!("✓ Replayed {}, still failing {}", replayed, failed);
        }
    }

    Ok(())
}

fn replay_all<P: Projection>(
    projector: &mut P,
    dlq: &DeadLetterQueue,
    letters: &[DeadLetter],
) -> Result<(usize, usize)> {
    let mut replayed = 0;
    let mut failed = 0;
    for letter in letters {
        match replay(projector, &letter.message()) {
            Ok(Outcome::Deferred) => {
                // its parent is still missing; a fresh projector would lose it
                tracing::warn!(
                    "Dead letter {} still waits for its parent, keeping it",
                    letter.id
                );
                dlq.mark_retry(letter.id)?;
                failed += 1;
            }
            Ok(_) => {
                dlq.remove(letter.id)?;
                replayed += 1;
            }
            Err(e) => {
                tracing::warn!("Dead letter {} failed again: {}", letter.id, e);
                dlq.mark_retry(letter.id)?;
                failed += 1;
            }
        }
    }
    Ok((replayed, failed))
}

fn print_letter(letter: &DeadLetter) {
    println!(
        "#{} {}[{}]@{} attempts={} retries={} at {}",
        letter.id,
        letter.topic,
        letter.partition,
        letter.offset,
        letter.attempts,
        letter.retry_count,
        letter.failed_at
    );
    println!("    error: {}", letter.error_message);
    if let Some(value) = &letter.value {
        println!("    payload: {}", String::from_utf8_lossy(value));
    }
}

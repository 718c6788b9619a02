//! Poll, decode, route, apply, commit.
//!
//! One runner drives one projection from one stream, a message at a time.
//! An offset is committed only after its message was applied, skipped as
//! undecodable, or written to the dead-letter sink. A message parked in a
//! pending buffer holds back the commit of its partition until it is
//! flushed or superseded, so a restart with the same group delivers it
//! again.

use crate::decoder::decode;
use crate::projection::{Outcome, Projection};
use crate::router::{self, Route, Target};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tributary_core::{
    error::{Result, TributaryError},
    observe, ChangeStream, DeadLetterSink, Position, RunnerConfig, SourceMessage,
};

/// Per-call counters; [`ProjectionRunner::totals`] accumulates them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub polled: usize,
    pub applied: usize,
    pub deferred: usize,
    pub skipped: usize,
    pub dead_lettered: usize,
    /// Last position committed
    pub committed_to: Option<Position>,
}

impl RunStats {
    fn absorb(&mut self, other: &RunStats) {
        self.polled += other.polled;
        self.applied += other.applied;
        self.deferred += other.deferred;
        self.skipped += other.skipped;
        self.dead_lettered += other.dead_lettered;
        if other.committed_to.is_some() {
            self.committed_to = other.committed_to.clone();
        }
    }
}

/// What happened to one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Applied,
    Deferred,
    Skipped,
    DeadLettered,
    /// Shutdown arrived while retrying; leave it uncommitted
    Interrupted,
}

/// Handle for shutting down a runner from another task
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Signal shutdown
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

type Slot = (String, i32);

pub struct ProjectionRunner<S, P> {
    stream: S,
    projection: P,
    config: RunnerConfig,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    shutdown: Arc<AtomicBool>,
    totals: RunStats,
    /// Next offset after the last message handled in this process
    progress: BTreeMap<Slot, i64>,
    /// Next offset as last committed by this runner
    committed: BTreeMap<Slot, i64>,
}

impl<S, P> ProjectionRunner<S, P>
where
    S: ChangeStream,
    P: Projection,
{
    pub fn new(stream: S, projection: P, config: RunnerConfig) -> Self {
        Self {
            stream,
            projection,
            config,
            dead_letters: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            totals: RunStats::default(),
            progress: BTreeMap::new(),
            committed: BTreeMap::new(),
        }
    }

    /// Send messages that exhaust their retries here instead of stopping
    pub fn with_dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn totals(&self) -> &RunStats {
        &self.totals
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Process one polled batch.
    ///
    /// On error the stream is rewound to its committed offsets so the failed
    /// message and everything after it are redelivered.
    pub async fn run_once(&mut self) -> Result<RunStats> {
        let start = Instant::now();
        let target = self.projection.target().as_str();
        let batch = self.stream.poll(self.config.batch_max)?;
        let mut stats = RunStats {
            polled: batch.len(),
            ..RunStats::default()
        };

        for message in &batch {
            if self.is_shutdown() {
                self.stream.seek_to_committed()?;
                break;
            }

            let slot = (message.topic.clone(), message.partition);
            if self
                .progress
                .get(&slot)
                .is_some_and(|next| message.offset < *next)
            {
                // redelivered after a rewind, already handled
                continue;
            }

            let step = match self.process(message).await {
                Ok(step) => step,
                Err(e) => {
                    self.totals.absorb(&stats);
                    self.stream.seek_to_committed()?;
                    return Err(e);
                }
            };

            match step {
                Step::Applied => stats.applied += 1,
                Step::Deferred => stats.deferred += 1,
                Step::Skipped => stats.skipped += 1,
                Step::DeadLettered => stats.dead_lettered += 1,
                Step::Interrupted => {
                    self.stream.seek_to_committed()?;
                    break;
                }
            }

            self.progress.insert(slot, message.offset + 1);
            if let Err(e) = self.commit_ready(&mut stats) {
                self.totals.absorb(&stats);
                self.stream.seek_to_committed()?;
                return Err(e);
            }
        }

        if stats.polled > 0 {
            observe::record_batch(target, start.elapsed(), stats.polled);
            tracing::debug!(
                "{}: polled {}, applied {}, deferred {}, skipped {}, dead-lettered {} in {:?}",
                target,
                stats.polled,
                stats.applied,
                stats.deferred,
                stats.skipped,
                stats.dead_lettered,
                start.elapsed()
            );
        }
        self.totals.absorb(&stats);
        Ok(stats)
    }

    /// Run until shutdown is signaled. Returns the accumulated totals.
    pub async fn run(&mut self) -> Result<RunStats> {
        tracing::info!("{} projection started", self.projection.target());

        while !self.is_shutdown() {
            let stats = self.run_once().await?;
            if stats.polled == 0 {
                tokio::time::sleep(self.config.poll_interval()).await;
            }
        }

        tracing::info!(
            "{} projection stopped ({} still buffered)",
            self.projection.target(),
            self.projection.pending()
        );
        Ok(self.totals.clone())
    }

    /// Run until the stream has nothing more to deliver
    pub async fn run_until_idle(&mut self) -> Result<RunStats> {
        let mut stats = RunStats::default();
        while !self.is_shutdown() {
            let batch = self.run_once().await?;
            let drained = batch.polled == 0;
            stats.absorb(&batch);
            if drained {
                break;
            }
        }
        Ok(stats)
    }

    /// Commit every partition up to its last handled message, but never at
    /// or past a message still waiting in the pending buffer
    fn commit_ready(&mut self, stats: &mut RunStats) -> Result<()> {
        let held = self.projection.held_offsets();
        let ready: Vec<(Slot, i64)> = self
            .progress
            .iter()
            .map(|(slot, next)| {
                let safe = held.get(slot).map_or(*next, |oldest| (*next).min(*oldest));
                (slot.clone(), safe)
            })
            .collect();

        for (slot, next) in ready {
            let done = match self.committed.get(&slot) {
                Some(done) => *done,
                None => self.stream.committed(&slot.0, slot.1)?.unwrap_or(0),
            };
            if next <= done {
                self.committed.insert(slot, done);
                continue;
            }

            let position = Position {
                topic: slot.0.clone(),
                partition: slot.1,
                offset: next - 1,
            };
            self.stream.commit(&position)?;
            observe::record_commit(&position.topic, position.partition, next);
            self.committed.insert(slot, next);
            stats.committed_to = Some(position);
        }
        Ok(())
    }

    async fn process(&mut self, message: &SourceMessage) -> Result<Step> {
        let Some(route) = prepare(self.projection.target(), message)? else {
            return Ok(Step::Skipped);
        };
        let target = self.projection.target().as_str();
        let retry = self.config.retry.clone();

        let mut attempt = 0;
        loop {
            let err = match self
                .projection
                .apply(route.clone(), Some(&message.position()))
            {
                Ok(Outcome::Applied) => return Ok(Step::Applied),
                Ok(Outcome::Deferred) => return Ok(Step::Deferred),
                Ok(Outcome::Ignored) => return Ok(Step::Skipped),
                Err(e) if e.is_decode() => {
                    tracing::warn!("Skipping {}: {}", message.position(), e);
                    observe::record_skipped(target, "decode");
                    return Ok(Step::Skipped);
                }
                Err(e) => e,
            };

            if attempt >= retry.max_retries {
                return self.dead_letter(message, err, attempt + 1);
            }
            if self.is_shutdown() {
                tracing::warn!(
                    "Shutdown while retrying {}, leaving it uncommitted: {}",
                    message.position(),
                    err
                );
                return Ok(Step::Interrupted);
            }

            let delay = retry.backoff.delay(attempt);
            attempt += 1;
            tracing::warn!(
                "Apply failed at {} (attempt {}/{}), retrying in {:?}: {}",
                message.position(),
                attempt,
                retry.max_retries + 1,
                delay,
                err
            );
            observe::record_retry(target);
            tokio::time::sleep(delay).await;
        }
    }

    fn dead_letter(
        &self,
        message: &SourceMessage,
        error: TributaryError,
        attempts: usize,
    ) -> Result<Step> {
        let Some(sink) = &self.dead_letters else {
            tracing::error!(
                "Apply failed at {} after {} attempts and no dead-letter queue is configured: {}",
                message.position(),
                attempts,
                error
            );
            return Err(error);
        };

        match sink.add(message, &error, attempts) {
            Ok(id) => {
                tracing::warn!(
                    "Message {} sent to DLQ (id: {}) after {} attempts: {}",
                    message.position(),
                    id,
                    attempts,
                    error
                );
                observe::record_dead_letter(self.projection.target().as_str());
                Ok(Step::DeadLettered)
            }
            Err(dlq_err) => {
                tracing::error!(
                    "Failed to add message {} to DLQ: {}",
                    message.position(),
                    dlq_err
                );
                Err(error)
            }
        }
    }
}

/// Re-apply a message outside any stream, e.g. a dead letter being replayed.
/// Nothing is committed and nothing is dead-lettered.
pub fn replay<P: Projection>(projection: &mut P, message: &SourceMessage) -> Result<Outcome> {
    match prepare(projection.target(), message)? {
        Some(route) => projection.apply(route, None),
        None => Ok(Outcome::Ignored),
    }
}

/// Decode and route. `Ok(None)` for anything that is skipped.
fn prepare(target: Target, message: &SourceMessage) -> Result<Option<Route>> {
    let record = match decode(message) {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::debug!("Tombstone at {}", message.position());
            observe::record_skipped(target.as_str(), "tombstone");
            return Ok(None);
        }
        Err(e) if e.is_decode() => {
            tracing::warn!("Skipping undecodable message: {}", e);
            observe::record_skipped(target.as_str(), "decode");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let route = match router::route(&record) {
        Ok(route) => route,
        Err(e) if e.is_decode() => {
            tracing::warn!("Skipping {} at {}: {}", record.table, message.position(), e);
            observe::record_skipped(target.as_str(), "decode");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    if route.target() != Some(target) {
        tracing::warn!(
            "Ignoring table '{}' at {}: not part of the {} projection",
            record.table,
            message.position(),
            target
        );
        observe::record_skipped(target.as_str(), "table");
        return Ok(None);
    }
    Ok(Some(route))
}

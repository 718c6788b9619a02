//! Optional metrics instrumentation for Tributary.
//!
//! When the `observe` feature is enabled, the projection loop emits
//! counters, histograms, and gauges via the [`metrics`] crate. A downstream
//! application must install a metrics recorder (e.g. `metrics-exporter-prometheus`)
//! to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a record applied to a target store.
///
/// - `tributary.records.applied_total` – counter with `target` and `table` labels
#[inline]
pub fn record_applied(target: &'static str, table: &str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!(
            "tributary.records.applied_total",
            "target" => target,
            "table" => table.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (target, table);
    }
}

/// Record a message skipped without touching the store.
///
/// - `tributary.records.skipped_total` – counter with `reason` label
#[inline]
pub fn record_skipped(target: &'static str, reason: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tributary.records.skipped_total", "target" => target, "reason" => reason)
            .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (target, reason);
    }
}

/// Record a child record parked in the pending-dependency buffer.
///
/// - `tributary.pending.deferred_total` – counter
/// - `tributary.pending.depth` – gauge of buffered records
#[inline]
pub fn record_deferred(target: &'static str, depth: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tributary.pending.deferred_total", "target" => target).increment(1);
        metrics::gauge!("tributary.pending.depth", "target" => target).set(depth as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (target, depth);
    }
}

/// Record buffered records released after their parent arrived.
///
/// - `tributary.pending.flushed_total` – counter
/// - `tributary.pending.depth` – gauge of buffered records
#[inline]
pub fn record_flushed(target: &'static str, flushed: usize, depth: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tributary.pending.flushed_total", "target" => target)
            .increment(flushed as u64);
        metrics::gauge!("tributary.pending.depth", "target" => target).set(depth as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (target, flushed, depth);
    }
}

/// Record a retried store write.
///
/// - `tributary.writes.retries_total` – counter
#[inline]
pub fn record_retry(target: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tributary.writes.retries_total", "target" => target).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = target;
    }
}

/// Record a message moved to the dead-letter queue.
///
/// - `tributary.dead_letters_total` – counter
#[inline]
pub fn record_dead_letter(target: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tributary.dead_letters_total", "target" => target).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = target;
    }
}

/// Record a committed stream position.
///
/// - `tributary.stream.committed_offset` – gauge with `topic` and `partition` labels
#[inline]
pub fn record_commit(topic: &str, partition: i32, offset: i64) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!(
            "tributary.stream.committed_offset",
            "topic" => topic.to_string(),
            "partition" => partition.to_string()
        )
        .set(offset as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (topic, partition, offset);
    }
}

/// Record a polled batch (counter + duration).
///
/// - `tributary.runner.batches_total` – counter
/// - `tributary.runner.batch_duration_seconds` – histogram
#[inline]
pub fn record_batch(target: &'static str, duration: std::time::Duration, messages: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tributary.runner.batches_total", "target" => target).increment(1);
        metrics::histogram!("tributary.runner.batch_duration_seconds", "target" => target)
            .record(duration.as_secs_f64());
        metrics::counter!("tributary.runner.messages_total", "target" => target)
            .increment(messages as u64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (target, duration, messages);
    }
}

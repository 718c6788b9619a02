//! Dead Letter Queue
//!
//! Stores messages that kept failing after their retries, for inspection
//! and replay.

use crate::connection::{sql_err, SharedConnection};
use rusqlite::{params, OptionalExtension, Row};
use tributary_core::{
    error::{Result, TributaryError},
    DeadLetter, DeadLetterSink, SourceMessage,
};

const COLUMNS: &str = "id, topic, partition_id, message_offset, message_key, payload, error_message,
                       attempts, failed_at, retry_count";

fn from_row(row: &Row<'_>) -> rusqlite::Result<DeadLetter> {
    Ok(DeadLetter {
        id: row.get(0)?,
        topic: row.get(1)?,
        partition: row.get(2)?,
        offset: row.get(3)?,
        key: row.get(4)?,
        value: row.get(5)?,
        error_message: row.get(6)?,
        attempts: row.get(7)?,
        failed_at: row.get(8)?,
        retry_count: row.get(9)?,
    })
}

/// Dead Letter Queue in the projection's own database
pub struct DeadLetterQueue {
    conn: SharedConnection,
}

impl DeadLetterQueue {
    /// Create a new dead letter queue on a shared connection
    pub fn new(conn: SharedConnection) -> Result<Self> {
        let dlq = Self { conn };
        dlq.init()?;
        Ok(dlq)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS dead_letter_queue (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    topic TEXT NOT NULL,
                    partition_id INTEGER NOT NULL,
                    message_offset INTEGER NOT NULL,
                    message_key BLOB,
                    payload BLOB,
                    error_message TEXT NOT NULL,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    failed_at TEXT NOT NULL DEFAULT (datetime('now')),
                    retry_count INTEGER NOT NULL DEFAULT 0,
                    last_retry_at TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_dlq_position
                    ON dead_letter_queue(topic, partition_id, message_offset);",
            )
            .map_err(sql_err)
    }

    /// Get a dead letter by ID
    pub fn get(&self, id: i64) -> Result<Option<DeadLetter>> {
        let sql = format!("SELECT {COLUMNS} FROM dead_letter_queue WHERE id = ?1");
        self.conn
            .lock()
            .query_row(&sql, [id], from_row)
            .optional()
            .map_err(sql_err)
    }

    /// Oldest first, so replay preserves source order
    pub fn list(&self, limit: usize) -> Result<Vec<DeadLetter>> {
        let sql = format!("SELECT {COLUMNS} FROM dead_letter_queue ORDER BY id ASC LIMIT ?1");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
        let letters = stmt
            .query_map([limit as i64], from_row)
            .map_err(sql_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(sql_err);
        letters
    }

    /// Record a replay attempt
    pub fn mark_retry(&self, id: i64) -> Result<()> {
        let n = self
            .conn
            .lock()
            .execute(
                "UPDATE dead_letter_queue
                 SET retry_count = retry_count + 1,
                     last_retry_at = datetime('now')
                 WHERE id = ?1",
                [id],
            )
            .map_err(sql_err)?;
        if n == 0 {
            return Err(TributaryError::NotFound(format!("dead letter {id}")));
        }
        Ok(())
    }

    pub fn remove(&self, id: i64) -> Result<bool> {
        let n = self
            .conn
            .lock()
            .execute("DELETE FROM dead_letter_queue WHERE id = ?1", [id])
            .map_err(sql_err)?;
        Ok(n > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM dead_letter_queue", [], |row| {
                row.get(0)
            })
            .map_err(sql_err)?;
        Ok(count as usize)
    }

    /// Clear all dead letters. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        self.conn
            .lock()
            .execute("DELETE FROM dead_letter_queue", [])
            .map_err(sql_err)
    }
}

impl DeadLetterSink for DeadLetterQueue {
    fn add(
        &self,
        message: &SourceMessage,
        error: &TributaryError,
        attempts: usize,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO dead_letter_queue
                 (topic, partition_id, message_offset, message_key, payload, error_message, attempts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.topic,
                message.partition,
                message.offset,
                message.key,
                message.value,
                error.to_string(),
                attempts as i64
            ],
        )
        .map_err(|e| TributaryError::DeadLetter(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::open_in_memory;

    fn message(offset: i64) -> SourceMessage {
        SourceMessage {
            topic: "university_db.public.students".into(),
            partition: 0,
            offset,
            key: Some(b"{\"student_id\":1}".to_vec()),
            value: Some(b"{\"op\":\"c\"}".to_vec()),
        }
    }

    #[test]
    fn add_list_and_remove() {
        let dlq = DeadLetterQueue::new(open_in_memory().unwrap()).unwrap();
        let err = TributaryError::Store("disk full".into());

        let first = dlq.add(&message(3), &err, 6).unwrap();
        let second = dlq.add(&message(4), &err, 6).unwrap();
        assert_eq!(dlq.count().unwrap(), 2);

        let listed = dlq.list(10).unwrap();
        assert_eq!(listed[0].id, first);
        assert_eq!(listed[0].message(), message(3));
        assert_eq!(listed[0].attempts, 6);
        assert!(listed[0].error_message.contains("disk full"));

        dlq.mark_retry(second).unwrap();
        assert_eq!(dlq.get(second).unwrap().unwrap().retry_count, 1);

        assert!(dlq.remove(first).unwrap());
        assert!(dlq.get(first).unwrap().is_none());
        assert_eq!(dlq.clear().unwrap(), 1);
        assert_eq!(dlq.count().unwrap(), 0);
    }

    #[test]
    fn tombstones_keep_null_payload() {
        let dlq = DeadLetterQueue::new(open_in_memory().unwrap()).unwrap();
        let mut msg = message(0);
        msg.value = None;
        let id = dlq
            .add(&msg, &TributaryError::Store("x".into()), 1)
            .unwrap();
        assert_eq!(dlq.get(id).unwrap().unwrap().value, None);
        assert!(dlq.mark_retry(id + 100).is_err());
    }
}

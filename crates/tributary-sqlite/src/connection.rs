use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::sync::Arc;
use std::time::Duration;
use tributary_core::{
    error::{Result, TributaryError},
    StoreConfig,
};

/// Connection shared between a store and its dead-letter queue
pub type SharedConnection = Arc<Mutex<Connection>>;

pub(crate) fn sql_err(e: rusqlite::Error) -> TributaryError {
    TributaryError::Store(e.to_string())
}

/// Open and configure a database file
pub fn open(cfg: &StoreConfig) -> Result<SharedConnection> {
    // Create parent directory if needed
    if let Some(parent) = cfg.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open_with_flags(
        &cfg.path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
    )
    .map_err(sql_err)?;

    if cfg.wal_mode {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| TributaryError::Config(e.to_string()))?;
    }
    conn.pragma_update(None, "synchronous", cfg.synchronous.as_pragma())
        .map_err(|e| TributaryError::Config(e.to_string()))?;
    conn.busy_timeout(Duration::from_millis(cfg.busy_timeout_ms))
        .map_err(|e| TributaryError::Config(e.to_string()))?;

    Ok(Arc::new(Mutex::new(conn)))
}

/// Private in-memory database, for tests and dry runs
pub fn open_in_memory() -> Result<SharedConnection> {
    let conn = Connection::open_in_memory().map_err(sql_err)?;
    Ok(Arc::new(Mutex::new(conn)))
}

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use tracing::{debug, info};

use super::options::StoreOptions;
use crate::error::Result;

/// Fixed-size pool of SQLite connections, handed out round-robin.
///
/// Connections are opened in WAL mode so readers never block the single
/// writer; writers queue on the database lock up to the busy timeout.
pub struct ConnectionPool {
    connections: Vec<Mutex<Connection>>,
    cursor: AtomicUsize,
    options: StoreOptions,
}

impl ConnectionPool {
    /// Opens `options.pool_size` connections to the database file.
    pub fn open(options: StoreOptions) -> Result<Self> {
        if let Some(parent) = options.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let size = options.pool_size.max(1);
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            connections.push(Mutex::new(open_connection(&options)?));
        }
        info!(
            path = %options.path.display(),
            pool_size = size,
            trace_sql = options.trace_sql,
            "opened edge store"
        );
        Ok(Self {
            connections,
            cursor: AtomicUsize::new(0),
            options,
        })
    }

    /// Options the pool was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Borrows a connection, preferring an idle one.
    pub fn get(&self) -> MutexGuard<'_, Connection> {
        let len = self.connections.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        for offset in 0..len {
            if let Some(guard) = self.connections[(start + offset) % len].try_lock() {
                return guard;
            }
        }
        self.connections[start].lock()
    }
}

fn open_connection(options: &StoreOptions) -> Result<Connection> {
    let mut conn = Connection::open(&options.path)?;
    conn.busy_timeout(options.busy_timeout)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    if options.trace_sql {
        conn.trace(Some(trace_statement));
    }
    debug!(journal_mode = %mode, "pooled connection ready");
    Ok(conn)
}

fn trace_statement(sql: &str) {
    debug!(target: "edgestore::sql", sql = %sql.trim(), "execute");
}

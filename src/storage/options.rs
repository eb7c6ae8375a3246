use std::path::PathBuf;
use std::time::Duration;

/// Configuration supplied when opening an [`super::ConnectionPool`].
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// SQLite database file; created when missing.
    pub path: PathBuf,
    /// Number of pooled connections.
    pub pool_size: usize,
    /// How long a connection waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// Maximum rows per INSERT statement inside one edge-type group.
    pub max_batch_rows: usize,
    /// Log every executed statement at debug level.
    pub trace_sql: bool,
}

/// Rows per statement keeps 9 bound columns well under SQLite's parameter cap.
pub const DEFAULT_MAX_BATCH_ROWS: usize = 500;

impl StoreOptions {
    /// Creates options with default settings for the database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool_size: 4,
            busy_timeout: Duration::from_millis(5_000),
            max_batch_rows: DEFAULT_MAX_BATCH_ROWS,
            trace_sql: false,
        }
    }

    /// Sets the number of pooled connections.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    /// Sets the busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets the per-statement row cap.
    pub fn max_batch_rows(mut self, rows: usize) -> Self {
        self.max_batch_rows = rows.max(1);
        self
    }

    /// Enables or disables statement tracing.
    pub fn trace_sql(mut self, enabled: bool) -> Self {
        self.trace_sql = enabled;
        self
    }
}

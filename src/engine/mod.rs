//! The edge store engine.
//!
//! [`EdgeStore`] owns the connection pool and exposes the operations both
//! ingress adapters dispatch to: type initialization, batched last-write-wins
//! saves, unconditional soft deletes, and raw read queries.

mod query;
mod validate;
mod write;

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::task;
use tracing::{debug, info};

use crate::error::{EdgeError, Result};
use crate::model::Edge;
use crate::storage::{schema, ConnectionPool, EdgeTypeName, StoreOptions};

pub use validate::{normalize_edges, validate_edges};
pub use write::WriteReport;

/// Shared handle to the edge tables. Cloning is cheap.
#[derive(Clone)]
pub struct EdgeStore {
    pool: Arc<ConnectionPool>,
}

impl EdgeStore {
    /// Opens (creating if needed) the database described by `options`.
    pub fn open(options: StoreOptions) -> Result<Self> {
        Ok(Self {
            pool: Arc::new(ConnectionPool::open(options)?),
        })
    }

    /// Storage options in effect.
    pub fn options(&self) -> &StoreOptions {
        self.pool.options()
    }

    /// Creates the table and indexes for an edge type. Idempotent.
    pub fn ensure_type(&self, name: &str) -> Result<EdgeTypeName> {
        let name = parse_type_name(name)?;
        let mut conn = self.pool.get();
        schema::ensure_type(&mut conn, &name)?;
        info!(edge_type = %name, "edge type ready");
        Ok(name)
    }

    /// Drops the table for an edge type. Meant for tests and cleanup tooling.
    pub fn drop_type(&self, name: &str) -> Result<()> {
        let name = parse_type_name(name)?;
        let conn = self.pool.get();
        schema::drop_type(&conn, &name)?;
        info!(edge_type = %name, "edge type dropped");
        Ok(())
    }

    /// Whether the table for an edge type exists.
    pub fn type_exists(&self, name: &str) -> Result<bool> {
        let name = parse_type_name(name)?;
        let conn = self.pool.get();
        Ok(schema::type_exists(&conn, &name)?)
    }

    /// Upserts `edges`, one batch per edge type.
    ///
    /// Validation covers the whole batch before any write. Groups then commit
    /// one at a time in first-appearance order, so a storage failure leaves
    /// earlier groups applied.
    pub fn save_many(&self, edges: &[Edge]) -> Result<WriteReport> {
        let names = validate_edges(edges)?;
        let groups = write::group_by_type(edges, names);
        let max_rows = self.options().max_batch_rows;
        let mut conn = self.pool.get();
        let report = write::save_groups(&mut conn, &groups, max_rows)?;
        debug!(groups = report.groups, rows = report.rows, "save complete");
        Ok(report)
    }

    /// Soft-deletes `edges`, stamping the current time as `updated`.
    ///
    /// Deletes win over any stored `updated`; ids with no row are ignored.
    pub fn delete_many(&self, edges: &[Edge]) -> Result<WriteReport> {
        self.delete_many_at(edges, OffsetDateTime::now_utc())
    }

    /// [`EdgeStore::delete_many`] with an explicit deletion stamp.
    pub fn delete_many_at(&self, edges: &[Edge], now: OffsetDateTime) -> Result<WriteReport> {
        let names = validate_edges(edges)?;
        let groups = write::group_by_type(edges, names);
        let max_rows = self.options().max_batch_rows;
        let mut conn = self.pool.get();
        let report = write::delete_groups(&mut conn, &groups, max_rows, now)?;
        debug!(groups = report.groups, rows = report.rows, "delete complete");
        Ok(report)
    }

    /// Executes a caller-supplied statement verbatim and maps rows onto edges.
    ///
    /// This is an unchecked escape hatch for ad-hoc reporting. Access to it
    /// must be gated before requests reach the store.
    pub fn run_query(&self, sql: &str) -> Result<Vec<Edge>> {
        if sql.trim().is_empty() {
            return Err(EdgeError::invalid(
                "You must provide a query to execute",
                "query",
            ));
        }
        let conn = self.pool.get();
        query::run_query(&conn, sql)
    }

    /// Runs a blocking store call on the blocking thread pool.
    pub async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&EdgeStore) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        task::spawn_blocking(move || op(&store)).await?
    }
}

fn parse_type_name(raw: &str) -> Result<EdgeTypeName> {
    EdgeTypeName::parse(raw).map_err(|reason| EdgeError::invalid(reason, "name"))
}

//! SQLite persistence for edge tables.
//!
//! Holds the connection pool, the per-type schema manager, and the
//! placeholder builder used to assemble batched statements.

/// Placeholder rendering for batched statements.
pub mod batch;

/// Edge-type table and index management.
pub mod schema;

mod options;
mod pool;

/// Storage configuration.
pub use options::{StoreOptions, DEFAULT_MAX_BATCH_ROWS};

/// Pooled SQLite connections.
pub use pool::ConnectionPool;

pub use schema::EdgeTypeName;

//! Edgestore: typed, directed edges between entities, kept in one SQLite
//! table per edge type.
//!
//! Writes merge by last-write-wins on the `updated` timestamp, deletes are
//! soft and unconditional, and reads are raw SQL mapped back into [`Edge`]
//! records. Two ingress adapters feed the same engine: the HTTP API in
//! [`server`] and the message relay in [`relay`].

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod relay;
pub mod server;
pub mod storage;

pub use crate::config::{ConfigError, ServiceConfig};
pub use crate::engine::{EdgeStore, WriteReport};
pub use crate::error::{EdgeError, Result, Violation};
pub use crate::model::{Edge, EdgeData, EdgeStatus, EntityId};
pub use crate::storage::{EdgeTypeName, StoreOptions};

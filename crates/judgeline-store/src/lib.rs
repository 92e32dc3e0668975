//! Judgeline Store
//!
//! This crate provides the storage trait and implementations for execution
//! snapshots. A snapshot is written once its execution reaches a terminal
//! stage and is read back by result queries.
//!
//! Two implementations are provided:
//! - [`MemoryStore`] keeps snapshots in a map, for tests and single-process use
//! - [`SqliteStore`] persists snapshots as JSON rows in SQLite

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use judgeline_types::Execution;
use uuid::Uuid;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested execution was not found.
  #[error("execution not found: {0}")]
  NotFound(Uuid),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// A snapshot could not be encoded or decoded.
  #[error("snapshot serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Storage trait for execution snapshots.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
  /// Insert or replace the snapshot of an execution.
  async fn save(&self, execution: &Execution) -> Result<(), Error>;

  /// Get the snapshot of an execution by id.
  async fn get(&self, exec_id: Uuid) -> Result<Execution, Error>;
}

use async_trait::async_trait;
use chrono::Utc;
use judgeline_types::Execution;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{Error, ExecutionStore};

/// SQLite-based store implementation.
///
/// Each execution is one row holding the JSON-encoded snapshot, with the
/// stage copied into its own column for filtering.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }
}

#[async_trait]
impl ExecutionStore for SqliteStore {
  async fn save(&self, execution: &Execution) -> Result<(), Error> {
    let snapshot = serde_json::to_string(execution)?;

    sqlx::query(
      r#"
      INSERT INTO executions (exec_id, stage, snapshot, created_at, updated_at)
      VALUES (?, ?, ?, ?, ?)
      ON CONFLICT (exec_id) DO UPDATE
      SET stage = excluded.stage, snapshot = excluded.snapshot, updated_at = excluded.updated_at
      "#,
    )
    .bind(execution.id.to_string())
    .bind(execution.stage.as_str())
    .bind(snapshot)
    .bind(execution.created_at)
    .bind(Utc::now())
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get(&self, exec_id: Uuid) -> Result<Execution, Error> {
    let row: Option<(String,)> = sqlx::query_as(
      r#"
      SELECT snapshot
      FROM executions
      WHERE exec_id = ?
      "#,
    )
    .bind(exec_id.to_string())
    .fetch_optional(&self.pool)
    .await?;

    let (snapshot,) = row.ok_or(Error::NotFound(exec_id))?;
    Ok(serde_json::from_str(&snapshot)?)
  }
}

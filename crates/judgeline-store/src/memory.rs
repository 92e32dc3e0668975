use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use judgeline_types::Execution;
use uuid::Uuid;

use crate::{Error, ExecutionStore};

/// In-memory store implementation.
#[derive(Default)]
pub struct MemoryStore {
  executions: RwLock<HashMap<Uuid, Execution>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self
      .executions
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
  async fn save(&self, execution: &Execution) -> Result<(), Error> {
    self
      .executions
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .insert(execution.id, execution.clone());
    Ok(())
  }

  async fn get(&self, exec_id: Uuid) -> Result<Execution, Error> {
    self
      .executions
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .get(&exec_id)
      .cloned()
      .ok_or(Error::NotFound(exec_id))
  }
}

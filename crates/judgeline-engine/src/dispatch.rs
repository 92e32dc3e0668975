//! Sends run requests to the runner.

use std::sync::Arc;
use std::time::Duration;

use judgeline_queue::{MessageQueue, QueueError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ExecError;

/// Sends encoded requests to the submission queue with bounded retries.
pub(crate) struct Dispatcher {
  queue: Arc<dyn MessageQueue>,
  submission_queue: String,
  attempts: u32,
  backoff: Duration,
}

impl Dispatcher {
  pub(crate) fn new(
    queue: Arc<dyn MessageQueue>,
    submission_queue: String,
    attempts: u32,
    backoff: Duration,
  ) -> Self {
    Self {
      queue,
      submission_queue,
      attempts: attempts.max(1),
      backoff,
    }
  }

  /// Send `body`, retrying transient failures. Oversized payloads are not
  /// retried.
  pub(crate) async fn send(&self, exec_id: Uuid, body: String) -> Result<(), ExecError> {
    let mut attempt = 1;
    loop {
      match self.queue.send(&self.submission_queue, body.clone()).await {
        Ok(()) => {
          debug!(exec_id = %exec_id, attempt, "request_dispatched");
          return Ok(());
        }
        Err(source @ QueueError::PayloadTooLarge { .. }) => {
          return Err(ExecError::Dispatch {
            attempts: attempt,
            source,
          });
        }
        Err(source) if attempt >= self.attempts => {
          return Err(ExecError::Dispatch {
            attempts: attempt,
            source,
          });
        }
        Err(e) => {
          warn!(exec_id = %exec_id, attempt, error = %e, "dispatch_retry");
          tokio::time::sleep(self.backoff * attempt).await;
          attempt += 1;
        }
      }
    }
  }
}

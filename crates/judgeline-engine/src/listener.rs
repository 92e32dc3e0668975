//! Routes runner reports from a result queue to live executions.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use judgeline_queue::{Delivery, MessageQueue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::registry::LiveRegistry;
use crate::wire::{Report, decode_result};

/// Long-running consumer of one result queue.
///
/// # Usage
///
/// ```ignore
/// let listener = ResultListener::new(queue, "results", registry);
/// let cancel = CancellationToken::new();
/// tokio::spawn(listener.run(cancel.clone()));
/// ```
pub struct ResultListener {
  queue: Arc<dyn MessageQueue>,
  queue_name: String,
  registry: Arc<LiveRegistry>,
  batch_size: usize,
  wait: Duration,
  error_backoff: Duration,
}

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteOutcome {
  Delivered,
  UnknownExecution,
  Undecodable,
}

impl ResultListener {
  pub fn new(
    queue: Arc<dyn MessageQueue>,
    queue_name: impl Into<String>,
    registry: Arc<LiveRegistry>,
  ) -> Self {
    Self {
      queue,
      queue_name: queue_name.into(),
      registry,
      batch_size: 10,
      wait: Duration::from_secs(1),
      error_backoff: Duration::from_millis(500),
    }
  }

  /// Override the batch size, long-poll wait and receive error back-off.
  pub fn with_polling(
    mut self,
    batch_size: usize,
    wait: Duration,
    error_backoff: Duration,
  ) -> Self {
    self.batch_size = batch_size.max(1);
    self.wait = wait;
    self.error_backoff = error_backoff;
    self
  }

  /// Receive and route until `cancel` fires. A batch that was already
  /// received is routed completely before returning.
  #[instrument(name = "result_listener", skip(self, cancel), fields(queue = %self.queue_name))]
  pub async fn run(self, cancel: CancellationToken) {
    info!(queue = %self.queue_name, "result_listener_started");

    loop {
      let received = tokio::select! {
        _ = cancel.cancelled() => break,
        received = self.queue.receive(&self.queue_name, self.batch_size, self.wait) => received,
      };

      match received {
        Ok(batch) if batch.is_empty() => {}
        Ok(batch) => {
          debug!(queue = %self.queue_name, count = batch.len(), "result_batch_received");
          join_all(batch.into_iter().map(|delivery| self.route(delivery))).await;
        }
        Err(e) => {
          error!(queue = %self.queue_name, error = %e, "result_receive_failed");
          tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(self.error_backoff) => {}
          }
        }
      }
    }

    info!(queue = %self.queue_name, "result_listener_stopped");
  }

  async fn route(&self, delivery: Delivery) -> RouteOutcome {
    let (exec_id, report) = match decode_result(&delivery.body) {
      Ok(decoded) => decoded,
      Err(e) => {
        // No execution to fail. Left unacked for redelivery or dead-lettering.
        warn!(
          queue = %self.queue_name,
          receive_count = delivery.receive_count,
          error = %e,
          "result_undecodable"
        );
        return RouteOutcome::Undecodable;
      }
    };

    if let Report::Malformed { error, .. } = &report {
      warn!(
        exec_id = %exec_id,
        msg_type = %report.msg_type(),
        error = %error,
        "result_malformed"
      );
    }

    let msg_type = report.msg_type().to_string();
    let outcome = match self.registry.handler(exec_id) {
      Some(handler) => match handler.send(report).await {
        Ok(()) => RouteOutcome::Delivered,
        Err(_) => RouteOutcome::UnknownExecution,
      },
      None => RouteOutcome::UnknownExecution,
    };

    if outcome == RouteOutcome::UnknownExecution {
      info!(exec_id = %exec_id, msg_type = %msg_type, "result_for_unknown_execution");
    }

    if let Err(e) = self.queue.ack(&self.queue_name, &delivery.receipt).await {
      warn!(exec_id = %exec_id, error = %e, "result_ack_failed");
    }

    outcome
  }
}

//! Per-execution lifecycle task.
//!
//! Each execution gets one task that exclusively owns its organizer, its
//! snapshot and the sending halves of its channels. The task feeds inbound
//! reports through the organizer, applies what comes out to the snapshot,
//! forwards it to the subscriber and, once a terminal event was applied,
//! persists the snapshot and releases the completion gate.

use std::sync::Arc;
use std::time::Duration;

use judgeline_organizer::StreamOrganizer;
use judgeline_store::ExecutionStore;
use judgeline_types::{Event, Execution};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, error, info, instrument, warn};

use crate::registry::LiveRegistry;
use crate::wire::Report;

pub(crate) struct ExecutionTask {
  pub(crate) execution: Execution,
  pub(crate) organizer: StreamOrganizer,
  pub(crate) inbound: mpsc::Receiver<Report>,
  pub(crate) notify: mpsc::Sender<Event>,
  pub(crate) gate: watch::Sender<bool>,
  pub(crate) registry: Arc<LiveRegistry>,
  pub(crate) store: Arc<dyn ExecutionStore>,
  pub(crate) persist_timeout: Duration,
  pub(crate) execution_timeout: Option<Duration>,
}

impl ExecutionTask {
  #[instrument(name = "execution_lifecycle", skip(self), fields(exec_id = %self.execution.id))]
  pub(crate) async fn run(mut self) {
    let exec_id = self.execution.id;
    let deadline = self.execution_timeout.map(|t| Instant::now() + t);

    loop {
      let next = match deadline {
        Some(deadline) => match timeout_at(deadline, self.inbound.recv()).await {
          Ok(next) => next,
          Err(_) => {
            warn!(exec_id = %exec_id, "execution_timed_out");
            self.force_internal_error("no terminal report before the execution timeout");
            break;
          }
        },
        None => self.inbound.recv().await,
      };

      let event = match next {
        Some(Report::Event(event)) => event,
        Some(Report::Malformed { msg_type, error }) => {
          let msg_type = msg_type.as_deref().unwrap_or("<missing>");
          error!(exec_id = %exec_id, msg_type = %msg_type, error = %error, "report_malformed");
          self.force_internal_error(&format!("malformed '{}' report: {}", msg_type, error));
          break;
        }
        None => {
          warn!(exec_id = %exec_id, "inbound_channel_closed");
          self.force_internal_error("result stream closed before completion");
          break;
        }
      };

      let kind = event.kind();
      match self.organizer.add(event) {
        Ok(ready) => {
          if ready.is_empty() {
            debug!(exec_id = %exec_id, event = %kind, "event_buffered");
          }
          for event in ready {
            self.emit(event);
          }
        }
        Err(e) => {
          error!(exec_id = %exec_id, event = %kind, error = %e, "organizer_protocol_error");
          self.force_internal_error(&e.to_string());
          break;
        }
      }

      if self.organizer.has_finished() {
        break;
      }
    }

    self.finish().await;
  }

  fn emit(&mut self, event: Event) {
    debug!(exec_id = %self.execution.id, event = %event.kind(), "event_emitted");
    self.execution.apply(&event);

    match self.notify.try_send(event) {
      Ok(()) => {}
      Err(mpsc::error::TrySendError::Full(event)) => {
        warn!(
          exec_id = %self.execution.id,
          event = %event.kind(),
          "notification_dropped"
        );
      }
      // Nobody listens or the listener went away.
      Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
  }

  fn force_internal_error(&mut self, message: &str) {
    self.emit(Event::InternalServerError {
      error_msg: Some(message.to_string()),
    });
  }

  async fn finish(self) {
    let ExecutionTask {
      execution,
      mut inbound,
      notify,
      gate,
      registry,
      store,
      persist_timeout,
      ..
    } = self;
    let exec_id = execution.id;

    inbound.close();
    drop(notify);
    registry.remove_channels(exec_id);

    match timeout(persist_timeout, store.save(&execution)).await {
      Ok(Ok(())) => {
        info!(exec_id = %exec_id, stage = %execution.stage, "execution_completed");
      }
      Ok(Err(e)) => {
        error!(exec_id = %exec_id, error = %e, "execution_persist_failed");
      }
      Err(_) => {
        error!(
          exec_id = %exec_id,
          timeout_ms = persist_timeout.as_millis() as u64,
          "execution_persist_timed_out"
        );
      }
    }

    gate.send_replace(true);
    registry.remove_gate(exec_id);
  }
}

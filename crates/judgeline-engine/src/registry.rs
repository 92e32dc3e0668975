//! Shared map of live executions.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use judgeline_types::Event;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::error::ExecError;
use crate::wire::Report;

/// Channels and completion gate of every live execution.
///
/// One mutex guards all three maps. Callers only insert, look up or remove
/// under it; channel I/O always happens after the guard is dropped.
#[derive(Default)]
pub struct LiveRegistry {
  inner: Mutex<Maps>,
}

#[derive(Default)]
struct Maps {
  /// Inbound senders the result listener routes reports into.
  handlers: HashMap<Uuid, mpsc::Sender<Report>>,
  /// Notification receivers, `None` once handed to a listener.
  notifiers: HashMap<Uuid, Option<mpsc::Receiver<Event>>>,
  /// Completion gates, `true` once the final snapshot was persisted.
  gates: HashMap<Uuid, watch::Receiver<bool>>,
}

impl LiveRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Maps> {
    self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub(crate) fn register(
    &self,
    exec_id: Uuid,
    handler: mpsc::Sender<Report>,
    notifier: mpsc::Receiver<Event>,
    gate: watch::Receiver<bool>,
  ) {
    let mut maps = self.lock();
    maps.handlers.insert(exec_id, handler);
    maps.notifiers.insert(exec_id, Some(notifier));
    maps.gates.insert(exec_id, gate);
  }

  /// Inbound sender of a live execution.
  pub fn handler(&self, exec_id: Uuid) -> Option<mpsc::Sender<Report>> {
    self.lock().handlers.get(&exec_id).cloned()
  }

  /// Hand out the notification receiver. Succeeds once per execution.
  pub(crate) fn take_notifier(&self, exec_id: Uuid) -> Result<mpsc::Receiver<Event>, ExecError> {
    match self.lock().notifiers.get_mut(&exec_id) {
      None => Err(ExecError::UnknownExecution(exec_id)),
      Some(slot) => slot.take().ok_or(ExecError::AlreadyListening(exec_id)),
    }
  }

  pub(crate) fn gate(&self, exec_id: Uuid) -> Option<watch::Receiver<bool>> {
    self.lock().gates.get(&exec_id).cloned()
  }

  /// Stop routing reports and notifications for an execution. The gate stays
  /// so result queries keep waiting until it is released.
  pub(crate) fn remove_channels(&self, exec_id: Uuid) {
    let mut maps = self.lock();
    maps.handlers.remove(&exec_id);
    maps.notifiers.remove(&exec_id);
  }

  pub(crate) fn remove_gate(&self, exec_id: Uuid) {
    self.lock().gates.remove(&exec_id);
  }

  /// Undo a registration whose dispatch failed.
  pub(crate) fn rollback(&self, exec_id: Uuid) {
    let mut maps = self.lock();
    maps.handlers.remove(&exec_id);
    maps.notifiers.remove(&exec_id);
    maps.gates.remove(&exec_id);
  }

  pub fn is_live(&self, exec_id: Uuid) -> bool {
    self.lock().handlers.contains_key(&exec_id)
  }

  /// Number of executions whose channels are registered.
  pub fn live_count(&self) -> usize {
    self.lock().handlers.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn register(registry: &LiveRegistry, exec_id: Uuid) -> watch::Sender<bool> {
    let (handler_tx, _handler_rx) = mpsc::channel(1);
    let (_notify_tx, notify_rx) = mpsc::channel(1);
    let (gate_tx, gate_rx) = watch::channel(false);
    registry.register(exec_id, handler_tx, notify_rx, gate_rx);
    gate_tx
  }

  #[test]
  fn test_notifier_is_taken_once() {
    let registry = LiveRegistry::new();
    let id = Uuid::now_v7();
    let _gate = register(&registry, id);

    assert!(registry.take_notifier(id).is_ok());
    assert!(matches!(
      registry.take_notifier(id),
      Err(ExecError::AlreadyListening(_))
    ));
    assert!(matches!(
      registry.take_notifier(Uuid::now_v7()),
      Err(ExecError::UnknownExecution(_))
    ));
  }

  #[test]
  fn test_removing_channels_keeps_gate() {
    let registry = LiveRegistry::new();
    let id = Uuid::now_v7();
    let _gate = register(&registry, id);
    assert!(registry.is_live(id));

    registry.remove_channels(id);
    assert!(!registry.is_live(id));
    assert!(registry.handler(id).is_none());
    assert!(registry.gate(id).is_some());

    registry.remove_gate(id);
    assert!(registry.gate(id).is_none());
  }

  #[test]
  fn test_rollback_removes_everything() {
    let registry = LiveRegistry::new();
    let id = Uuid::now_v7();
    let _gate = register(&registry, id);

    registry.rollback(id);
    assert_eq!(registry.live_count(), 0);
    assert!(registry.gate(id).is_none());
    assert!(matches!(
      registry.take_notifier(id),
      Err(ExecError::UnknownExecution(_))
    ));
  }
}

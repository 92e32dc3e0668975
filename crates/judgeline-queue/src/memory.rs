use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tracing::warn;

use crate::error::QueueError;
use crate::{DEFAULT_MAX_PAYLOAD, Delivery, MessageQueue};

/// Configuration for [`MemoryQueue`].
#[derive(Debug, Clone)]
pub struct MemoryQueueConfig {
  /// How long a received message stays hidden before it is redelivered.
  pub visibility_timeout: Duration,
  /// Maximum message body size in bytes.
  pub max_payload: usize,
  /// After this many deliveries without an ack a message is moved to the
  /// queue's dead letters instead of being redelivered.
  pub max_receives: Option<u32>,
}

impl Default for MemoryQueueConfig {
  fn default() -> Self {
    Self {
      visibility_timeout: Duration::from_secs(30),
      max_payload: DEFAULT_MAX_PAYLOAD,
      max_receives: None,
    }
  }
}

struct StoredMessage {
  body: String,
  receipt: Option<String>,
  receive_count: u32,
  visible_at: Instant,
}

#[derive(Default)]
struct QueueState {
  messages: Vec<StoredMessage>,
  dead_letters: Vec<String>,
}

#[derive(Default)]
struct Queues {
  queues: HashMap<String, QueueState>,
  closed: bool,
}

/// In-process queue with visibility-timeout redelivery.
///
/// Queues are created on first use. Cloning is not supported; share it
/// behind an `Arc`.
pub struct MemoryQueue {
  config: MemoryQueueConfig,
  inner: Mutex<Queues>,
  arrived: Notify,
}

impl Default for MemoryQueue {
  fn default() -> Self {
    Self::new(MemoryQueueConfig::default())
  }
}

impl MemoryQueue {
  pub fn new(config: MemoryQueueConfig) -> Self {
    Self {
      config,
      inner: Mutex::new(Queues::default()),
      arrived: Notify::new(),
    }
  }

  /// Number of messages in `queue`, in flight or not.
  pub fn len(&self, queue: &str) -> usize {
    self
      .lock()
      .queues
      .get(queue)
      .map_or(0, |state| state.messages.len())
  }

  /// Bodies moved aside after exceeding `max_receives`.
  pub fn dead_letters(&self, queue: &str) -> Vec<String> {
    self
      .lock()
      .queues
      .get(queue)
      .map(|state| state.dead_letters.clone())
      .unwrap_or_default()
  }

  /// Make every further operation fail with [`QueueError::Unavailable`].
  pub fn close(&self) {
    self.lock().closed = true;
    self.arrived.notify_waiters();
  }

  fn lock(&self) -> MutexGuard<'_, Queues> {
    self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Hand out up to `max` visible messages. Returns the deliveries and the
  /// earliest instant a hidden message becomes visible again.
  fn take_visible(
    &self,
    queue: &str,
    max: usize,
  ) -> Result<(Vec<Delivery>, Option<Instant>), QueueError> {
    let mut inner = self.lock();
    if inner.closed {
      return Err(unavailable());
    }

    let now = Instant::now();
    let state = inner.queues.entry(queue.to_string()).or_default();
    let max_receives = self.config.max_receives;

    let (dead, alive): (Vec<_>, Vec<_>) = state.messages.drain(..).partition(|msg| {
      msg.visible_at <= now && max_receives.is_some_and(|max| msg.receive_count >= max)
    });
    state.messages = alive;
    for msg in dead {
      warn!(queue = %queue, receive_count = msg.receive_count, "message_dead_lettered");
      state.dead_letters.push(msg.body);
    }

    let mut deliveries = Vec::new();
    let mut next_visible: Option<Instant> = None;
    for msg in state.messages.iter_mut() {
      if msg.visible_at > now {
        next_visible = Some(next_visible.map_or(msg.visible_at, |t| t.min(msg.visible_at)));
        continue;
      }
      if deliveries.len() >= max {
        continue;
      }

      let receipt = uuid::Uuid::new_v4().to_string();
      msg.receipt = Some(receipt.clone());
      msg.receive_count += 1;
      msg.visible_at = now + self.config.visibility_timeout;
      deliveries.push(Delivery {
        body: msg.body.clone(),
        receipt,
        receive_count: msg.receive_count,
      });
    }

    Ok((deliveries, next_visible))
  }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
  async fn send(&self, queue: &str, body: String) -> Result<(), QueueError> {
    if body.len() > self.config.max_payload {
      return Err(QueueError::PayloadTooLarge {
        size: body.len(),
        limit: self.config.max_payload,
      });
    }

    {
      let mut inner = self.lock();
      if inner.closed {
        return Err(unavailable());
      }
      inner
        .queues
        .entry(queue.to_string())
        .or_default()
        .messages
        .push(StoredMessage {
          body,
          receipt: None,
          receive_count: 0,
          visible_at: Instant::now(),
        });
    }

    self.arrived.notify_waiters();
    Ok(())
  }

  async fn receive(
    &self,
    queue: &str,
    max: usize,
    wait: Duration,
  ) -> Result<Vec<Delivery>, QueueError> {
    let deadline = Instant::now() + wait;

    loop {
      // Register interest before looking so a send in between is not missed.
      let arrived = self.arrived.notified();
      tokio::pin!(arrived);
      arrived.as_mut().enable();

      let (deliveries, next_visible) = self.take_visible(queue, max)?;
      if !deliveries.is_empty() || Instant::now() >= deadline {
        return Ok(deliveries);
      }

      let wake_at = next_visible.map_or(deadline, |t| t.min(deadline));
      tokio::select! {
        _ = &mut arrived => {}
        _ = sleep_until(wake_at) => {}
      }
    }
  }

  async fn ack(&self, queue: &str, receipt: &str) -> Result<(), QueueError> {
    let mut inner = self.lock();
    if inner.closed {
      return Err(unavailable());
    }

    let state = inner.queues.get_mut(queue);
    let position = state.as_ref().and_then(|state| {
      state
        .messages
        .iter()
        .position(|msg| msg.receipt.as_deref() == Some(receipt) && msg.visible_at > Instant::now())
    });

    match (state, position) {
      (Some(state), Some(index)) => {
        state.messages.remove(index);
        Ok(())
      }
      _ => Err(QueueError::UnknownReceipt {
        queue: queue.to_string(),
        receipt: receipt.to_string(),
      }),
    }
  }
}

fn unavailable() -> QueueError {
  QueueError::Unavailable {
    message: "queue closed".to_string(),
  }
}

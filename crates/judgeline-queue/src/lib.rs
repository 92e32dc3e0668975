//! Judgeline Queue
//!
//! Transport between the engine and the remote runner. Requests go out on a
//! submission queue and progress reports come back on a result queue. The
//! transport is at-least-once: a received message stays invisible for a
//! visibility timeout and is redelivered unless acknowledged before it runs
//! out.

mod error;
mod memory;

pub use error::QueueError;
pub use memory::{MemoryQueue, MemoryQueueConfig};

use std::time::Duration;

use async_trait::async_trait;

/// Default maximum message body size (256 KiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 256 * 1024;

/// A received message awaiting acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
  pub body: String,
  /// Handle used to acknowledge this particular delivery.
  pub receipt: String,
  /// How many times the message has been handed out, this delivery included.
  pub receive_count: u32,
}

/// At-least-once message queue.
#[async_trait]
pub trait MessageQueue: Send + Sync {
  /// Send a message body to `queue`.
  async fn send(&self, queue: &str, body: String) -> Result<(), QueueError>;

  /// Receive up to `max` messages, waiting at most `wait` for the first one.
  ///
  /// Returns an empty vector when nothing arrived in time.
  async fn receive(
    &self,
    queue: &str,
    max: usize,
    wait: Duration,
  ) -> Result<Vec<Delivery>, QueueError>;

  /// Acknowledge a delivery so it is not redelivered.
  async fn ack(&self, queue: &str, receipt: &str) -> Result<(), QueueError>;
}

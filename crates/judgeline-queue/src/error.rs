/// Errors that can occur on queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
  /// The message body exceeds the queue's payload limit.
  #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
  PayloadTooLarge { size: usize, limit: usize },

  /// The receipt does not match an in-flight delivery, e.g. it already
  /// became visible again.
  #[error("unknown receipt '{receipt}' on queue '{queue}'")]
  UnknownReceipt { queue: String, receipt: String },

  /// The queue backend is not reachable.
  #[error("queue unavailable: {message}")]
  Unavailable { message: String },
}

//! Engine error types.

use judgeline_organizer::OrganizerError;
use judgeline_queue::QueueError;
use uuid::Uuid;

/// Synchronous rejection of an execution request. Nothing is created or
/// dispatched when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
  #[error("unknown language '{lang_id}'")]
  UnknownLanguage { lang_id: String },

  #[error("cpu time limit {cpu_ms} ms is outside (0, {max}]")]
  CpuLimit { cpu_ms: u32, max: u32 },

  #[error("memory limit {mem_kib} KiB is outside (0, {max}]")]
  MemoryLimit { mem_kib: u32, max: u32 },

  #[error("checker of {size} bytes exceeds {max} bytes")]
  CheckerTooLarge { size: usize, max: usize },

  #[error("interactor of {size} bytes exceeds {max} bytes")]
  InteractorTooLarge { size: usize, max: usize },

  #[error("{count} tests exceed the limit of {max}")]
  TooManyTests { count: usize, max: usize },

  /// A test lacks inline content or a (sha256, url) pair for one side.
  #[error("test {test_id} has no usable {side}")]
  MalformedTest { test_id: usize, side: &'static str },
}

/// Errors encoding or decoding queue messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
  #[error("invalid message json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("message has no valid exec_id")]
  MissingExecId,

  #[error("invalid base64 body: {0}")]
  Base64(#[from] base64::DecodeError),

  #[error("zstd: {0}")]
  Compression(#[from] std::io::Error),

  #[error("event did not serialize to an object")]
  NotAnObject,
}

/// Errors returned by [`ExecService`](crate::ExecService).
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
  #[error(transparent)]
  Validation(#[from] ValidationError),

  /// The external partner key is missing or wrong.
  #[error("invalid api key")]
  InvalidApiKey,

  #[error("failed to encode dispatch request: {0}")]
  Wire(#[from] WireError),

  /// The request could not be handed to the runner.
  #[error("dispatch failed after {attempts} attempt(s): {source}")]
  Dispatch {
    attempts: u32,
    #[source]
    source: QueueError,
  },

  #[error("organizer error: {0}")]
  Organizer(#[from] OrganizerError),

  /// The execution is not live, either unknown or already completed.
  #[error("execution {0} is not live")]
  UnknownExecution(Uuid),

  /// The live event stream was already handed out.
  #[error("execution {0} already has a listener")]
  AlreadyListening(Uuid),

  #[error("execution {0} not found")]
  NotFound(Uuid),

  #[error("cancelled")]
  Cancelled,

  #[error("store error: {0}")]
  Store(#[from] judgeline_store::Error),
}

//! Engine configuration.

use std::env;
use std::time::Duration;

/// Validation ceilings applied to every execution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecLimits {
  /// Maximum CPU time limit a request may ask for, in milliseconds.
  pub max_cpu_ms: u32,
  /// Maximum memory limit a request may ask for, in kibibytes.
  pub max_mem_kib: u32,
  /// Maximum checker source size in bytes.
  pub max_checker_bytes: usize,
  /// Maximum interactor source size in bytes.
  pub max_interactor_bytes: usize,
  pub max_tests: usize,
}

impl Default for ExecLimits {
  fn default() -> Self {
    Self {
      max_cpu_ms: 10_000,
      max_mem_kib: 1024 * 1024,
      max_checker_bytes: 1024 * 1024,
      max_interactor_bytes: 1024 * 1024,
      max_tests: 200,
    }
  }
}

/// Configuration for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Queue the runner takes requests from.
  pub submission_queue: String,
  /// Queue the runner reports progress to.
  pub result_queue: String,
  /// Result queue for external partner executions. Falls back to
  /// `result_queue` when unset.
  pub external_result_queue: Option<String>,
  /// Key external partners must present. External enqueue is disabled
  /// without one.
  pub external_api_key: Option<String>,

  /// Capacity of each execution's notification channel.
  pub notify_buffer: usize,
  /// Capacity of each execution's inbound handler channel.
  pub handler_buffer: usize,
  /// Upper bound on persisting a finished execution.
  pub persist_timeout: Duration,

  /// Maximum messages per receive call.
  pub receive_batch: usize,
  /// Long-poll duration of one receive call.
  pub receive_wait: Duration,
  /// Pause after a failed receive call.
  pub receive_error_backoff: Duration,

  /// Send run requests as base64 zstd frames instead of plain JSON.
  pub compress: bool,
  /// Send attempts per dispatch before giving up.
  pub dispatch_attempts: u32,
  /// Base delay between send attempts, multiplied by the attempt number.
  pub dispatch_backoff: Duration,

  /// Executions without a terminal report after this long are forced to
  /// internal_error.
  pub execution_timeout: Option<Duration>,

  pub limits: ExecLimits,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      submission_queue: "judgeline-submissions".to_string(),
      result_queue: "judgeline-results".to_string(),
      external_result_queue: None,
      external_api_key: None,
      notify_buffer: 1000,
      handler_buffer: 64,
      persist_timeout: Duration::from_secs(10),
      receive_batch: 10,
      receive_wait: Duration::from_secs(1),
      receive_error_backoff: Duration::from_millis(500),
      compress: true,
      dispatch_attempts: 3,
      dispatch_backoff: Duration::from_millis(200),
      execution_timeout: Some(Duration::from_secs(15 * 60)),
      limits: ExecLimits::default(),
    }
  }
}

impl EngineConfig {
  /// Build a configuration from `JUDGELINE_*` environment variables, using
  /// defaults for anything unset or unparsable.
  ///
  /// | Variable | Field |
  /// |---|---|
  /// | `JUDGELINE_SUBMISSION_QUEUE` | `submission_queue` |
  /// | `JUDGELINE_RESULT_QUEUE` | `result_queue` |
  /// | `JUDGELINE_EXTERNAL_RESULT_QUEUE` | `external_result_queue` |
  /// | `JUDGELINE_EXTERNAL_API_KEY` | `external_api_key` |
  /// | `JUDGELINE_NOTIFY_BUFFER` | `notify_buffer` |
  /// | `JUDGELINE_HANDLER_BUFFER` | `handler_buffer` |
  /// | `JUDGELINE_PERSIST_TIMEOUT_MS` | `persist_timeout` |
  /// | `JUDGELINE_COMPRESS` | `compress` (`0`/`false` disables) |
  /// | `JUDGELINE_DISPATCH_ATTEMPTS` | `dispatch_attempts` |
  /// | `JUDGELINE_EXECUTION_TIMEOUT_SECS` | `execution_timeout` (0 disables) |
  pub fn from_env() -> Self {
    Self::from_lookup(|key| env::var(key).ok())
  }

  fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let defaults = Self::default();
    let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

    Self {
      submission_queue: lookup("JUDGELINE_SUBMISSION_QUEUE").unwrap_or(defaults.submission_queue),
      result_queue: lookup("JUDGELINE_RESULT_QUEUE").unwrap_or(defaults.result_queue),
      external_result_queue: lookup("JUDGELINE_EXTERNAL_RESULT_QUEUE")
        .or(defaults.external_result_queue),
      external_api_key: lookup("JUDGELINE_EXTERNAL_API_KEY")
        .filter(|key| !key.is_empty())
        .or(defaults.external_api_key),
      notify_buffer: parsed("JUDGELINE_NOTIFY_BUFFER")
        .map_or(defaults.notify_buffer, |n| n.max(1) as usize),
      handler_buffer: parsed("JUDGELINE_HANDLER_BUFFER")
        .map_or(defaults.handler_buffer, |n| n.max(1) as usize),
      persist_timeout: parsed("JUDGELINE_PERSIST_TIMEOUT_MS")
        .map_or(defaults.persist_timeout, Duration::from_millis),
      compress: match lookup("JUDGELINE_COMPRESS").as_deref().map(str::trim) {
        Some("0") | Some("false") => false,
        Some("1") | Some("true") => true,
        _ => defaults.compress,
      },
      dispatch_attempts: parsed("JUDGELINE_DISPATCH_ATTEMPTS")
        .map_or(defaults.dispatch_attempts, |n| n.clamp(1, 10) as u32),
      execution_timeout: match parsed("JUDGELINE_EXECUTION_TIMEOUT_SECS") {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => defaults.execution_timeout,
      },
      ..defaults
    }
  }

  /// Queue the runner should report to for an execution.
  pub fn reply_queue(&self, external: bool) -> &str {
    match (&self.external_result_queue, external) {
      (Some(queue), true) => queue.as_str(),
      _ => self.result_queue.as_str(),
    }
  }
}

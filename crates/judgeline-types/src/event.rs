//! Runner progress events.
//!
//! The runner reports progress as a stream of [`Event`]s. Each event has a
//! dedup/ordering [`EventKey`]: the event kind, plus the test id for the
//! per-test kinds. Two events with the same key are the same report.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::RunData;

/// A progress report from the runner.
///
/// Serialized with an internal `msg_type` tag, which is the tag carried by
/// inbound result messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg_type", rename_all = "snake_case")]
pub enum Event {
  /// The runner picked up the request.
  #[serde(alias = "started_evaluation")]
  ReceivedSubmission {
    /// Testing hardware description.
    #[serde(default)]
    sys_info: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
  },

  #[serde(rename = "started_compilation")]
  StartedCompiling,

  #[serde(rename = "finished_compilation")]
  FinishedCompiling {
    #[serde(default)]
    runtime_data: Option<RunData>,
  },

  StartedTesting,

  ReachedTest {
    test_id: u32,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    answer: Option<String>,
  },

  IgnoredTest { test_id: u32 },

  FinishedTest {
    test_id: u32,
    #[serde(default)]
    submission: Option<RunData>,
    #[serde(default)]
    checker: Option<RunData>,
  },

  FinishedTesting,

  CompilationError {
    #[serde(default)]
    error_msg: Option<String>,
  },

  InternalServerError {
    #[serde(default)]
    error_msg: Option<String>,
  },
}

impl Event {
  pub fn kind(&self) -> EventKind {
    match self {
      Event::ReceivedSubmission { .. } => EventKind::ReceivedSubmission,
      Event::StartedCompiling => EventKind::StartedCompiling,
      Event::FinishedCompiling { .. } => EventKind::FinishedCompiling,
      Event::StartedTesting => EventKind::StartedTesting,
      Event::ReachedTest { .. } => EventKind::ReachedTest,
      Event::IgnoredTest { .. } => EventKind::IgnoredTest,
      Event::FinishedTest { .. } => EventKind::FinishedTest,
      Event::FinishedTesting => EventKind::FinishedTesting,
      Event::CompilationError { .. } => EventKind::CompilationError,
      Event::InternalServerError { .. } => EventKind::InternalServerError,
    }
  }

  pub fn key(&self) -> EventKey {
    match self {
      Event::ReceivedSubmission { .. } => EventKey::ReceivedSubmission,
      Event::StartedCompiling => EventKey::StartedCompiling,
      Event::FinishedCompiling { .. } => EventKey::FinishedCompiling,
      Event::StartedTesting => EventKey::StartedTesting,
      Event::ReachedTest { test_id, .. } => EventKey::ReachedTest(*test_id),
      Event::IgnoredTest { test_id } => EventKey::IgnoredTest(*test_id),
      Event::FinishedTest { test_id, .. } => EventKey::FinishedTest(*test_id),
      Event::FinishedTesting => EventKey::FinishedTesting,
      Event::CompilationError { .. } => EventKey::CompilationError,
      Event::InternalServerError { .. } => EventKey::InternalServerError,
    }
  }
}

/// Event type without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  ReceivedSubmission,
  StartedCompiling,
  FinishedCompiling,
  StartedTesting,
  ReachedTest,
  IgnoredTest,
  FinishedTest,
  FinishedTesting,
  CompilationError,
  InternalServerError,
}

impl EventKind {
  /// Wire tag of this kind.
  pub fn as_str(self) -> &'static str {
    match self {
      EventKind::ReceivedSubmission => "received_submission",
      EventKind::StartedCompiling => "started_compilation",
      EventKind::FinishedCompiling => "finished_compilation",
      EventKind::StartedTesting => "started_testing",
      EventKind::ReachedTest => "reached_test",
      EventKind::IgnoredTest => "ignored_test",
      EventKind::FinishedTest => "finished_test",
      EventKind::FinishedTesting => "finished_testing",
      EventKind::CompilationError => "compilation_error",
      EventKind::InternalServerError => "internal_server_error",
    }
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Dedup and ordering key of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKey {
  ReceivedSubmission,
  StartedCompiling,
  FinishedCompiling,
  StartedTesting,
  ReachedTest(u32),
  IgnoredTest(u32),
  FinishedTest(u32),
  FinishedTesting,
  CompilationError,
  InternalServerError,
}

impl EventKey {
  pub fn kind(self) -> EventKind {
    match self {
      EventKey::ReceivedSubmission => EventKind::ReceivedSubmission,
      EventKey::StartedCompiling => EventKind::StartedCompiling,
      EventKey::FinishedCompiling => EventKind::FinishedCompiling,
      EventKey::StartedTesting => EventKind::StartedTesting,
      EventKey::ReachedTest(_) => EventKind::ReachedTest,
      EventKey::IgnoredTest(_) => EventKind::IgnoredTest,
      EventKey::FinishedTest(_) => EventKind::FinishedTest,
      EventKey::FinishedTesting => EventKind::FinishedTesting,
      EventKey::CompilationError => EventKind::CompilationError,
      EventKey::InternalServerError => EventKind::InternalServerError,
    }
  }

  /// Test id of a per-test key.
  pub fn test_id(self) -> Option<u32> {
    match self {
      EventKey::ReachedTest(id) | EventKey::IgnoredTest(id) | EventKey::FinishedTest(id) => {
        Some(id)
      }
      _ => None,
    }
  }

  /// Whether nothing may be emitted after this key.
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      EventKey::FinishedTesting | EventKey::CompilationError | EventKey::InternalServerError
    )
  }

  /// Whether this key only exists for languages with a compile step.
  pub fn is_compilation(self) -> bool {
    matches!(
      self,
      EventKey::StartedCompiling | EventKey::FinishedCompiling | EventKey::CompilationError
    )
  }
}

impl fmt::Display for EventKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.test_id() {
      Some(id) => write!(f, "{}-{}", self.kind(), id),
      None => write!(f, "{}", self.kind()),
    }
  }
}

//! Organizer error types.

use judgeline_types::EventKey;

/// Protocol violations detected while organizing one execution's stream.
///
/// None of these are retryable: the runner's reports for the execution are
/// inconsistent and the execution cannot complete normally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrganizerError {
  /// The expected test count exceeds the organizer's ceiling.
  #[error("too many tests: {num_tests} (max {max})")]
  TooManyTests { num_tests: usize, max: usize },

  /// A per-test event referenced a test id outside `1..=N`.
  #[error("test id {test_id} out of range 1..={num_tests}")]
  TestIdOutOfRange { test_id: u32, num_tests: u32 },

  /// A compilation event arrived for a language without a compile step.
  #[error("unexpected {key} for a language without compilation")]
  UnexpectedCompilation { key: EventKey },

  /// Both finished_test and ignored_test were reported for the same test.
  #[error("test {test_id} reported as both finished and ignored")]
  ConflictingTestOutcome { test_id: u32 },
}

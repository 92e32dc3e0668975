//! Static dependency graph between event keys.
//!
//! Each key has a requirement in conjunctive form: every group must contain
//! at least one emitted key. Successor edges are the reverse of those
//! requirements and drive the emit cascade.

use judgeline_types::EventKey;

/// Conjunction of alternatives: all groups must be satisfied, a group is
/// satisfied by any one of its keys.
pub(crate) type Requirement = Vec<Vec<EventKey>>;

#[derive(Debug, Clone, Copy)]
pub(crate) struct KeyGraph {
  has_compilation: bool,
  num_tests: u32,
}

impl KeyGraph {
  pub(crate) fn new(has_compilation: bool, num_tests: u32) -> Self {
    Self {
      has_compilation,
      num_tests,
    }
  }

  pub(crate) fn has_compilation(&self) -> bool {
    self.has_compilation
  }

  pub(crate) fn num_tests(&self) -> u32 {
    self.num_tests
  }

  /// Keys that must have been emitted before `key` can be emitted.
  pub(crate) fn requirement(&self, key: EventKey) -> Requirement {
    match key {
      EventKey::ReceivedSubmission | EventKey::InternalServerError => vec![],
      EventKey::StartedCompiling => vec![vec![EventKey::ReceivedSubmission]],
      EventKey::FinishedCompiling => vec![vec![EventKey::StartedCompiling]],
      EventKey::CompilationError => vec![vec![EventKey::FinishedCompiling]],
      EventKey::StartedTesting if self.has_compilation => {
        vec![vec![EventKey::FinishedCompiling]]
      }
      EventKey::StartedTesting => vec![vec![EventKey::ReceivedSubmission]],
      EventKey::ReachedTest(1) => vec![vec![EventKey::StartedTesting]],
      EventKey::ReachedTest(id) => vec![
        vec![EventKey::ReachedTest(id - 1)],
        Self::outcomes(id - 1),
      ],
      EventKey::FinishedTest(id) | EventKey::IgnoredTest(id) => {
        vec![vec![EventKey::ReachedTest(id)]]
      }
      EventKey::FinishedTesting if self.num_tests == 0 => vec![vec![EventKey::StartedTesting]],
      EventKey::FinishedTesting => vec![
        vec![EventKey::StartedTesting],
        Self::outcomes(self.num_tests),
      ],
    }
  }

  /// Keys whose requirement mentions `key`, in the order the cascade visits
  /// them. Terminal keys come first so they cut the stream short.
  pub(crate) fn successors(&self, key: EventKey) -> Vec<EventKey> {
    match key {
      EventKey::ReceivedSubmission if self.has_compilation => vec![EventKey::StartedCompiling],
      EventKey::ReceivedSubmission => vec![EventKey::StartedTesting],
      EventKey::StartedCompiling => vec![EventKey::FinishedCompiling],
      EventKey::FinishedCompiling => vec![EventKey::CompilationError, EventKey::StartedTesting],
      EventKey::StartedTesting if self.num_tests == 0 => vec![EventKey::FinishedTesting],
      EventKey::StartedTesting => vec![EventKey::ReachedTest(1), EventKey::FinishedTesting],
      EventKey::ReachedTest(id) => {
        let mut next = vec![EventKey::FinishedTest(id), EventKey::IgnoredTest(id)];
        next.push(self.after_test(id));
        next
      }
      EventKey::FinishedTest(id) | EventKey::IgnoredTest(id) => vec![self.after_test(id)],
      EventKey::FinishedTesting | EventKey::CompilationError | EventKey::InternalServerError => {
        vec![]
      }
    }
  }

  fn after_test(&self, id: u32) -> EventKey {
    if id < self.num_tests {
      EventKey::ReachedTest(id + 1)
    } else {
      EventKey::FinishedTesting
    }
  }

  fn outcomes(id: u32) -> Vec<EventKey> {
    vec![EventKey::FinishedTest(id), EventKey::IgnoredTest(id)]
  }
}

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use judgeline_types::{Event, EventKey};
use tracing::debug;

use crate::error::OrganizerError;
use crate::graph::KeyGraph;

/// Maximum number of tests one organizer accepts.
pub const MAX_TESTS: usize = 1000;

/// Per-execution dedup and reorder state machine.
///
/// [`add`](Self::add) and [`has_finished`](Self::has_finished) take `&self`
/// and may be called concurrently; all state sits behind one mutex.
pub struct StreamOrganizer {
  graph: KeyGraph,
  state: Mutex<OrganizerState>,
}

#[derive(Default)]
struct OrganizerState {
  received: HashSet<EventKey>,
  emitted: HashSet<EventKey>,
  buffered: HashMap<EventKey, Event>,
  finished_tests: u32,
  ignored_tests: u32,
  terminated: bool,
}

impl StreamOrganizer {
  /// Create an organizer for an execution with `num_tests` tests.
  pub fn new(has_compilation: bool, num_tests: usize) -> Result<Self, OrganizerError> {
    if num_tests > MAX_TESTS {
      return Err(OrganizerError::TooManyTests {
        num_tests,
        max: MAX_TESTS,
      });
    }

    Ok(Self {
      graph: KeyGraph::new(has_compilation, num_tests as u32),
      state: Mutex::new(OrganizerState::default()),
    })
  }

  /// Consume one event and return every event that became emittable, in
  /// canonical order.
  ///
  /// Redelivered events and events arriving after the stream ended yield an
  /// empty vector.
  pub fn add(&self, event: Event) -> Result<Vec<Event>, OrganizerError> {
    let mut state = self.lock();
    if state.terminated {
      return Ok(vec![]);
    }

    let key = event.key();
    self.check(&state, key)?;

    // Every buffered key is also received, so one instance per key at most.
    if state.received.contains(&key) {
      debug!(key = %key, "duplicate_event_dropped");
      return Ok(vec![]);
    }

    state.received.insert(key);
    state.buffered.insert(key, event);

    Ok(self.cascade(&mut state, key))
  }

  /// Whether a terminal event has been emitted. Once true, stays true.
  pub fn has_finished(&self) -> bool {
    self.lock().terminated
  }

  fn lock(&self) -> MutexGuard<'_, OrganizerState> {
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn check(&self, state: &OrganizerState, key: EventKey) -> Result<(), OrganizerError> {
    if let Some(test_id) = key.test_id() {
      let num_tests = self.graph.num_tests();
      if test_id == 0 || test_id > num_tests {
        return Err(OrganizerError::TestIdOutOfRange { test_id, num_tests });
      }
    }

    if key.is_compilation() && !self.graph.has_compilation() {
      return Err(OrganizerError::UnexpectedCompilation { key });
    }

    let opposite = match key {
      EventKey::FinishedTest(id) => Some((id, EventKey::IgnoredTest(id))),
      EventKey::IgnoredTest(id) => Some((id, EventKey::FinishedTest(id))),
      _ => None,
    };
    if let Some((test_id, opposite)) = opposite
      && state.received.contains(&opposite)
    {
      return Err(OrganizerError::ConflictingTestOutcome { test_id });
    }

    Ok(())
  }

  /// Emit `start` and everything it unblocks, depth first.
  fn cascade(&self, state: &mut OrganizerState, start: EventKey) -> Vec<Event> {
    let mut ready = Vec::new();
    let mut stack = vec![start];

    while let Some(key) = stack.pop() {
      if state.emitted.contains(&key) || !self.is_ready(state, key) {
        continue;
      }
      let Some(event) = state.buffered.remove(&key) else {
        continue;
      };

      state.emitted.insert(key);
      match key {
        EventKey::FinishedTest(_) => state.finished_tests += 1,
        EventKey::IgnoredTest(_) => state.ignored_tests += 1,
        _ => {}
      }
      ready.push(event);

      if key.is_terminal() {
        state.terminated = true;
        state.buffered.clear();
        break;
      }

      stack.extend(self.graph.successors(key).into_iter().rev());
    }

    ready
  }

  fn is_ready(&self, state: &OrganizerState, key: EventKey) -> bool {
    if !state.received.contains(&key) {
      return false;
    }

    let satisfied = self
      .graph
      .requirement(key)
      .iter()
      .all(|group| group.iter().any(|pred| state.emitted.contains(pred)));

    if key == EventKey::FinishedTesting {
      satisfied && state.finished_tests + state.ignored_tests == self.graph.num_tests()
    } else {
      satisfied
    }
  }
}

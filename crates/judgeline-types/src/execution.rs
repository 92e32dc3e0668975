use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Event;
use crate::language::Language;
use crate::request::ResourceParams;

/// Coarse lifecycle phase of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  Waiting,
  Compiling,
  Testing,
  Finished,
  CompileError,
  InternalError,
}

impl Stage {
  /// Whether no further progress can happen from this stage.
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      Stage::Finished | Stage::CompileError | Stage::InternalError
    )
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Stage::Waiting => "waiting",
      Stage::Compiling => "compiling",
      Stage::Testing => "testing",
      Stage::Finished => "finished",
      Stage::CompileError => "compile_error",
      Stage::InternalError => "internal_error",
    }
  }
}

impl std::fmt::Display for Stage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Runtime data of one sandboxed process run (compilation, solution or checker).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunData {
  /// Standard input preview.
  #[serde(default)]
  pub stdin: String,
  /// Standard output preview.
  #[serde(default)]
  pub stdout: String,
  /// Standard error preview.
  #[serde(default)]
  pub stderr: String,
  /// User-mode CPU time in milliseconds.
  pub cpu_ms: i64,
  /// Wall clock time in milliseconds.
  pub wall_ms: i64,
  /// Peak resident set size in kibibytes.
  pub mem_kib: i64,
  pub exit_code: i64,
  /// Voluntary context switches, e.g. waiting for I/O.
  #[serde(default)]
  pub ctx_sw_voluntary: i64,
  /// Involuntary context switches, e.g. preempted while waiting for CPU.
  #[serde(default)]
  pub ctx_sw_forced: i64,
  /// Signal that terminated the process, if any.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub signal: Option<i64>,
  /// Sandbox status string reported by the runner.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub isolate_status: Option<String>,
}

/// Result of a single test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
  /// 1-based test id.
  pub id: u32,
  /// Trimmed test input preview.
  pub input: Option<String>,
  /// Trimmed expected answer preview.
  pub answer: Option<String>,
  pub reached: bool,
  /// Set when the runner skipped the test, e.g. another test of its group failed.
  pub ignored: bool,
  pub finished: bool,
  /// Runtime data of the submitted program.
  pub program: Option<RunData>,
  /// Runtime data of the checker.
  pub checker: Option<RunData>,
}

/// Canonical state of one execution.
///
/// Created with [`Stage::Waiting`] at enqueue time and mutated only by
/// applying organized events through [`Execution::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
  pub id: Uuid,
  pub stage: Stage,
  pub test_results: Vec<TestResult>,
  pub language: Language,
  pub params: ResourceParams,
  pub error_msg: Option<String>,
  /// Testing hardware description reported by the runner.
  pub sys_info: Option<String>,
  /// Runtime data of compiling the submission.
  pub compile_data: Option<RunData>,
  pub created_at: DateTime<Utc>,
}

impl Execution {
  /// Create a waiting execution with `num_tests` empty test results.
  pub fn new(id: Uuid, language: Language, params: ResourceParams, num_tests: usize) -> Self {
    let test_results = (1..=num_tests as u32)
      .map(|id| TestResult {
        id,
        ..TestResult::default()
      })
      .collect();

    Self {
      id,
      stage: Stage::Waiting,
      test_results,
      language,
      params,
      error_msg: None,
      sys_info: None,
      compile_data: None,
      created_at: Utc::now(),
    }
  }

  /// Apply one event that has already been put in canonical order.
  ///
  /// Per-test events referencing an id outside `1..=N` are ignored; the
  /// organizer rejects those before they get here.
  pub fn apply(&mut self, event: &Event) {
    match event {
      Event::ReceivedSubmission { sys_info, .. } => {
        self.sys_info = Some(sys_info.clone());
      }
      Event::StartedCompiling => self.stage = Stage::Compiling,
      Event::FinishedCompiling { runtime_data } => {
        self.compile_data = runtime_data.clone();
      }
      Event::StartedTesting => self.stage = Stage::Testing,
      Event::ReachedTest {
        test_id,
        input,
        answer,
      } => {
        if let Some(test) = self.test_mut(*test_id) {
          test.input = input.clone();
          test.answer = answer.clone();
          test.reached = true;
        }
      }
      Event::FinishedTest {
        test_id,
        submission,
        checker,
      } => {
        if let Some(test) = self.test_mut(*test_id) {
          test.program = submission.clone();
          test.checker = checker.clone();
          test.finished = true;
        }
      }
      Event::IgnoredTest { test_id } => {
        if let Some(test) = self.test_mut(*test_id) {
          test.ignored = true;
        }
      }
      Event::FinishedTesting => self.stage = Stage::Finished,
      Event::CompilationError { error_msg } => {
        self.stage = Stage::CompileError;
        self.error_msg = error_msg.clone();
      }
      Event::InternalServerError { error_msg } => {
        self.stage = Stage::InternalError;
        self.error_msg = error_msg.clone();
      }
    }
  }

  fn test_mut(&mut self, test_id: u32) -> Option<&mut TestResult> {
    let index = (test_id as usize).checked_sub(1)?;
    self.test_results.get_mut(index)
  }
}

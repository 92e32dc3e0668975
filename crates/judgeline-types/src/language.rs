use serde::{Deserialize, Serialize};

/// A programming language / compiler / interpreter the runner supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
  /// Short id, e.g. "cpp17" or "python3.11".
  pub id: String,
  /// User-facing name, e.g. "C++17 (GCC)".
  pub name: String,
  /// Filename the source code is written to inside the sandbox.
  pub code_filename: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub compile_cmd: Option<String>,
  /// Artifact moved out of the sandbox after compilation.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub compiled_filename: Option<String>,
  pub exec_cmd: String,
}

impl Language {
  /// Whether submissions in this language go through a compile step.
  pub fn has_compilation(&self) -> bool {
    self.compile_cmd.is_some()
  }
}

use std::io;

/// Errors that can occur while loading a language catalog.
#[derive(Debug, thiserror::Error)]
pub enum LangError {
  #[error("failed to read catalog: {0}")]
  Io(#[from] io::Error),

  #[error("invalid catalog: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("language '{id}' is listed more than once")]
  DuplicateId { id: String },

  /// A compiled language must name the artifact its compile step produces.
  #[error("language '{id}' has a compile command but no compiled filename")]
  MissingCompiledFilename { id: String },
}

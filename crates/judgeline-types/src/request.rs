use serde::{Deserialize, Serialize};

/// User submitted source code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
  pub code: String,
  pub lang_id: String,
}

/// Resource limits and optional testlib programs for one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceParams {
  /// Maximum user-mode CPU time in milliseconds.
  pub cpu_ms: u32,
  /// Maximum resident set size in kibibytes.
  pub mem_kib: u32,
  /// Optional testlib checker source. Without one only the program output
  /// is reported, which is not enough for grading.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub checker: Option<String>,
  /// Optional testlib interactor source.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub interactor: Option<String>,
}

/// Input and expected answer of one test.
///
/// Each side is supplied either inline or as a content hash plus download
/// URL the runner can cache by.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFile {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub in_sha256: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub in_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub in_content: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ans_sha256: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ans_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ans_content: Option<String>,
}

/// Where one side of a test file comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSource<'a> {
  Inline(&'a str),
  Remote { sha256: &'a str, url: &'a str },
}

impl TestFile {
  pub fn inline(input: impl Into<String>, answer: impl Into<String>) -> Self {
    Self {
      in_content: Some(input.into()),
      ans_content: Some(answer.into()),
      ..Self::default()
    }
  }

  pub fn input(&self) -> Option<FileSource<'_>> {
    source(&self.in_content, &self.in_sha256, &self.in_url)
  }

  pub fn answer(&self) -> Option<FileSource<'_>> {
    source(&self.ans_content, &self.ans_sha256, &self.ans_url)
  }
}

fn source<'a>(
  content: &'a Option<String>,
  sha256: &'a Option<String>,
  url: &'a Option<String>,
) -> Option<FileSource<'a>> {
  match (content, sha256, url) {
    (Some(content), _, _) => Some(FileSource::Inline(content)),
    (None, Some(sha256), Some(url)) => Some(FileSource::Remote { sha256, url }),
    _ => None,
  }
}

use std::path::Path;

use judgeline_types::Language;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::LangError;
use crate::registry::LanguageRegistry;

/// One entry of a catalog file.
///
/// A catalog file is a JSON array of entries:
/// ```json
/// [
///   {
///     "id": "cpp17",
///     "name": "C++17 (GCC)",
///     "code_filename": "main.cpp",
///     "compile_cmd": "g++ -std=c++17 -o main main.cpp",
///     "compiled_filename": "main",
///     "exec_cmd": "./main"
///   }
/// ]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
  #[serde(flatten)]
  pub language: Language,
  /// Disabled entries are kept in the file but never resolved.
  #[serde(default = "default_enabled")]
  pub enabled: bool,
}

fn default_enabled() -> bool {
  true
}

/// In-memory language registry with a fixed set of languages.
#[derive(Debug, Clone, Default)]
pub struct StaticLanguageRegistry {
  languages: Vec<Language>,
}

impl StaticLanguageRegistry {
  /// Build a registry from languages, rejecting duplicate ids.
  pub fn new(languages: Vec<Language>) -> Result<Self, LangError> {
    for (i, lang) in languages.iter().enumerate() {
      if languages[..i].iter().any(|other| other.id == lang.id) {
        return Err(LangError::DuplicateId {
          id: lang.id.clone(),
        });
      }
      if lang.compile_cmd.is_some() && lang.compiled_filename.is_none() {
        return Err(LangError::MissingCompiledFilename {
          id: lang.id.clone(),
        });
      }
    }
    Ok(Self { languages })
  }

  /// The languages the runner ships with.
  pub fn builtin() -> Self {
    Self {
      languages: vec![
        interpreted("python3.11", "Python 3.11", "main.py", "python3.11 main.py"),
        compiled(
          "go1.21",
          "Go 1.21",
          "main.go",
          "go build main.go",
          "main",
          "./main",
        ),
        compiled(
          "java21",
          "Java SE 21",
          "Main.java",
          "javac Main.java",
          "Main.class",
          "java -Xss64M -Xmx1024M -Xms8M -XX:NewRatio=2 -XX:TieredStopAtLevel=1 -XX:+UseSerialGC Main",
        ),
        compiled(
          "cpp17",
          "C++17 (GCC)",
          "main.cpp",
          "g++ -std=c++17 -o main main.cpp",
          "main",
          "./main",
        ),
      ],
    }
  }

  /// Parse a JSON catalog. Disabled entries are dropped.
  pub fn from_json(content: &str) -> Result<Self, LangError> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(content)?;
    let languages = entries
      .into_iter()
      .filter(|entry| entry.enabled)
      .map(|entry| entry.language)
      .collect();
    Self::new(languages)
  }

  /// Load a JSON catalog file.
  pub async fn load(path: impl AsRef<Path>) -> Result<Self, LangError> {
    let content = fs::read_to_string(path).await?;
    Self::from_json(&content)
  }
}

impl LanguageRegistry for StaticLanguageRegistry {
  fn get(&self, id: &str) -> Option<Language> {
    self.languages.iter().find(|lang| lang.id == id).cloned()
  }

  fn list(&self) -> Vec<Language> {
    self.languages.clone()
  }
}

fn interpreted(id: &str, name: &str, code_filename: &str, exec_cmd: &str) -> Language {
  Language {
    id: id.to_string(),
    name: name.to_string(),
    code_filename: code_filename.to_string(),
    compile_cmd: None,
    compiled_filename: None,
    exec_cmd: exec_cmd.to_string(),
  }
}

fn compiled(
  id: &str,
  name: &str,
  code_filename: &str,
  compile_cmd: &str,
  compiled_filename: &str,
  exec_cmd: &str,
) -> Language {
  Language {
    compile_cmd: Some(compile_cmd.to_string()),
    compiled_filename: Some(compiled_filename.to_string()),
    ..interpreted(id, name, code_filename, exec_cmd)
  }
}

use judgeline_types::Language;

/// Lookup of the languages the runner supports.
pub trait LanguageRegistry: Send + Sync {
  /// Get an enabled language by id.
  fn get(&self, id: &str) -> Option<Language>;

  /// List all enabled languages.
  fn list(&self) -> Vec<Language>;
}

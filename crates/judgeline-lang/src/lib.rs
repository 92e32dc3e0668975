//! Judgeline Languages
//!
//! Catalog of the programming languages the runner can compile and execute.
//! The engine resolves a submission's `lang_id` through a [`LanguageRegistry`];
//! [`StaticLanguageRegistry`] serves a built-in set or a JSON catalog file.

mod catalog;
mod error;
mod registry;

pub use catalog::{CatalogEntry, StaticLanguageRegistry};
pub use error::LangError;
pub use registry::LanguageRegistry;

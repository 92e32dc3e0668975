//! Judgeline Types
//!
//! Serializable types shared by every judgeline crate: the canonical
//! [`Execution`] snapshot, the runner progress [`Event`] union, language
//! descriptors and the request types accepted by the engine.
//!
//! The JSON shapes defined here are the wire format exchanged with the
//! remote runner and the storage format used by the execution store.

mod event;
mod execution;
mod language;
mod request;

pub use event::{Event, EventKey, EventKind};
pub use execution::{Execution, RunData, Stage, TestResult};
pub use language::Language;
pub use request::{FileSource, ResourceParams, Submission, TestFile};

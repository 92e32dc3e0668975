//! Judgeline Stream Organizer
//!
//! The runner reports progress over an at-least-once queue, so reports for
//! one execution arrive duplicated and in any order. A [`StreamOrganizer`]
//! turns that stream back into the single canonical order:
//!
//! ```text
//! received_submission
//! started_compilation   (compiled languages only)
//! finished_compilation  (compiled languages only)
//! started_testing
//! reached_test(1), finished_test(1) | ignored_test(1)
//! ...
//! reached_test(N), finished_test(N) | ignored_test(N)
//! finished_testing
//! ```
//!
//! `compilation_error` follows `finished_compilation` and
//! `internal_server_error` may be emitted at any point. Both end the stream.
//!
//! # Usage
//!
//! ```ignore
//! let organizer = StreamOrganizer::new(true, 2)?;
//!
//! for event in reports {
//!   for ready in organizer.add(event)? {
//!     apply(ready);
//!   }
//!   if organizer.has_finished() {
//!     break;
//!   }
//! }
//! ```

mod error;
mod graph;
mod organizer;

pub use error::OrganizerError;
pub use organizer::{MAX_TESTS, StreamOrganizer};

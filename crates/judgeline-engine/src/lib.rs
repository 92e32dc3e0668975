//! Judgeline Engine
//!
//! Drives executions on a remote runner from request to final snapshot.
//!
//! ```text
//! ┌──────────────┐  validate + dispatch  ┌────────────────────┐
//! │ ExecService  │ ────────────────────▶ │  submission queue  │ ──▶ runner
//! └──────────────┘                       └────────────────────┘       │
//!        │ register                                                   │
//!        ▼                                                            ▼
//! ┌──────────────┐   route by exec_id    ┌────────────────────┐
//! │ LiveRegistry │ ◀──────────────────── │   ResultListener   │ ◀── result queue
//! └──────────────┘                       └────────────────────┘
//!        │ one inbound channel per execution
//!        ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ lifecycle task: StreamOrganizer → Execution::apply → notify  │
//! │ on terminal event: persist, release completion gate          │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod dispatch;
mod error;
mod lifecycle;
mod listener;
mod registry;
mod service;
mod validate;
pub mod wire;

pub use config::{EngineConfig, ExecLimits};
pub use error::{ExecError, ValidationError, WireError};
pub use listener::ResultListener;
pub use registry::LiveRegistry;
pub use service::ExecService;
pub use validate::validate_request;

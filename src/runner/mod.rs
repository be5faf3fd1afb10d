//! Process orchestration
//!
//! Executes submitted source under an external interpreter, either to
//! completion (one-shot) or as a live event stream that accepts input.
//!
//! ## Flow
//!
//! ```text
//! request ─▶ SourcePreparer ─▶ DependencyAuditor ─▶ SessionRegistry::register
//!                                                        │
//!                       ┌────────────────────────────────┴──────────┐
//!                       ▼                                           ▼
//!                 OneShotRunner                            InteractiveRunner
//!           (collect, classify, respond)          (stream events, accept input)
//!                       │                                           │
//!                       └────────── release + artifact drop ◀───────┘
//! ```

pub mod audit;
pub mod classify;
pub mod interactive;
pub mod interpreter;
pub mod oneshot;
pub mod process;
pub mod registry;
pub mod service;
pub mod source;
pub mod types;

pub use audit::{DependencyAuditor, ModuleCheck};
pub use interactive::{detect_input_request, EventStream, InteractiveRunner};
pub use interpreter::{Interpreter, InterpreterLocator};
pub use oneshot::OneShotRunner;
pub use registry::{ProcessHandle, SessionInfo, SessionRegistry};
pub use service::{HealthReport, RunnerService};
pub use source::{Artifact, SourcePreparer};
pub use types::{
    ExecutionMode, ExecutionRequest, ExecutionResult, FailureKind, ModuleStatus, StreamEvent,
};

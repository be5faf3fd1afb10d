//! # coderun
//!
//! Runs submitted source text under an external interpreter and reports the
//! result, either as a single collected response or as a live event stream
//! that accepts input while the program runs.
//!
//! ## Features
//!
//! - **Session-scoped processes:** at most one live process per session id
//! - **Interactive streaming:** output, error and input-request events over SSE
//! - **Dependency audit:** missing imports are reported before the program runs
//! - **Guaranteed cleanup:** artifacts and registry entries are released on every exit path

pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod runner;

pub use config::Config;
pub use error::{Error, Result};
pub use runner::RunnerService;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");

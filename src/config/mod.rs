//! Configuration module
//!
//! - types/mod.rs: Core configuration types (Config, GatewayConfig, LogConfig)
//! - types/runner.rs: Interpreter, artifact and audit settings
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

pub use types::{Config, GatewayConfig, LogConfig, LogFormat};

pub use types::runner::{AuditConfig, RunnerConfig, DEFAULT_PREAMBLE};

pub use io::{apply_env_overrides, apply_overrides_from, load_config, load_config_from_path, save_config};
pub use paths::{config_dir, config_path};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};

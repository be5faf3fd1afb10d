//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::Config;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_runner_config(config, result);
    result = validate_gateway_config(config, result);

    result
}

fn validate_runner_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let runner = &config.runner;

    if runner.interpreter_candidates.iter().all(|c| c.trim().is_empty()) {
        result = result.with_error(
            ValidationIssue::new("runner.interpreter_candidates", "No interpreter candidates configured")
                .with_suggestion("Set CODERUN_INTERPRETERS=python3,python or list candidates in config"),
        );
    }

    if runner.fallback_interpreter.trim().is_empty() {
        result = result.with_error(
            ValidationIssue::new("runner.fallback_interpreter", "Fallback interpreter name is empty")
                .with_suggestion("Use \"python3\""),
        );
    }

    if runner.event_buffer == 0 {
        result = result.with_error(
            ValidationIssue::new("runner.event_buffer", "Event buffer must be at least 1")
                .with_suggestion("Use the default of 256"),
        );
    }

    if runner.artifact_extension.contains(['/', '\\', '.']) {
        result = result.with_error(ValidationIssue::new(
            "runner.artifact_extension",
            format!("Invalid artifact extension: {}", runner.artifact_extension),
        ));
    }

    if !runner.audit.enabled {
        result = result.with_warning(
            ValidationIssue::new(
                "runner.audit.enabled",
                "Dependency audit disabled. Missing modules are only reported after a run fails.",
            )
            .with_suggestion("Set CODERUN_AUDIT=true"),
        );
    }

    result
}

fn validate_gateway_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let bind = config.gateway.bind.as_str();

    if bind.parse::<std::net::IpAddr>().is_err() && bind != "localhost" {
        result = result.with_error(
            ValidationIssue::new("gateway.bind", format!("Invalid bind address: {}", bind))
                .with_suggestion("Use an IP address such as 127.0.0.1"),
        );
    } else if !matches!(bind, "127.0.0.1" | "::1" | "localhost") {
        result = result.with_warning(
            ValidationIssue::new(
                "gateway.bind",
                format!("Gateway listens on non-loopback address {}. Submitted code runs unsandboxed.", bind),
            )
            .with_suggestion("Put an authenticating proxy in front of the gateway"),
        );
    }

    result
}

//! Request, result and event types shared by both runners

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How a submitted program is executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Run to completion and return one aggregated result
    #[default]
    OneShot,
    /// Stream output as events and accept input while running
    Interactive,
}

impl std::str::FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "one-shot" | "oneshot" | "once" => Ok(ExecutionMode::OneShot),
            "interactive" | "stream" => Ok(ExecutionMode::Interactive),
            _ => Err(Error::InvalidInput(format!(
                "Unknown execution mode: {}. Supported: one-shot, interactive",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::OneShot => write!(f, "one-shot"),
            ExecutionMode::Interactive => write!(f, "interactive"),
        }
    }
}

/// Request to execute source text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// Source text to execute
    #[serde(alias = "code")]
    pub source_text: String,
    /// Session identifier (minted when absent)
    #[serde(default)]
    pub session_id: Option<String>,
    /// Execution mode
    #[serde(default)]
    pub mode: ExecutionMode,
}

impl ExecutionRequest {
    /// Create a new execution request
    pub fn new(source_text: impl Into<String>, mode: ExecutionMode) -> Self {
        ExecutionRequest {
            source_text: source_text.into(),
            session_id: None,
            mode,
        }
    }

    /// Set the session identifier
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Reject requests that cannot be executed
    pub fn validate(&self) -> Result<()> {
        if self.source_text.trim().is_empty() {
            return Err(Error::InvalidInput("sourceText must not be empty".to_string()));
        }
        Ok(())
    }

    /// The caller's session id, or a freshly minted one
    pub fn resolve_session_id(&self) -> String {
        match self.session_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => mint_session_id(),
        }
    }
}

/// Mint a new opaque session identifier
pub fn mint_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Why a one-shot run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No interpreter candidate passed its version check
    InterpreterUnavailable,
    /// The interpreter could not be launched
    Spawn,
    /// The program exited non-zero
    Runtime,
}

/// Result of a one-shot run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// True iff the exit code is zero
    pub success: bool,
    /// Captured (or synthesized) standard output
    pub output: String,
    /// Captured (or synthesized) error text
    pub error: String,
    /// Process exit code, -1 when the process never ran or was killed by a signal
    pub exit_code: i32,
    /// Session the run belonged to
    pub session_id: String,
    /// Modules the pre-run audit could not import
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_modules: Vec<String>,
    /// Remediation text for missing modules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Failure category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
}

impl ExecutionResult {
    /// Result for a run whose process could not be started
    pub fn launch_failure(session_id: impl Into<String>, error: &Error) -> Self {
        let failure_kind = match error {
            Error::InterpreterUnavailable(_) => FailureKind::InterpreterUnavailable,
            _ => FailureKind::Spawn,
        };
        ExecutionResult {
            success: false,
            output: String::new(),
            error: error.to_string(),
            exit_code: -1,
            session_id: session_id.into(),
            missing_modules: Vec::new(),
            hint: None,
            failure_kind: Some(failure_kind),
        }
    }

    /// Whether the process could not be started at all
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self.failure_kind,
            Some(FailureKind::InterpreterUnavailable) | Some(FailureKind::Spawn)
        )
    }
}

/// One record of an interactive event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The process was started (or its start was attempted)
    Start {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// A chunk of standard output
    Output { data: String },
    /// A chunk of standard error, or a service notice
    Error { data: String },
    /// The trailing output line looks like a prompt
    InputRequest { prompt: String },
    /// The process exited; always the last event
    Exit { code: i32 },
}

impl StreamEvent {
    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::Output { .. } => "output",
            StreamEvent::Error { .. } => "error",
            StreamEvent::InputRequest { .. } => "input_request",
            StreamEvent::Exit { .. } => "exit",
        }
    }

    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Exit { .. })
    }
}

/// Import check outcome for a single module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    /// Whether the module imported cleanly
    pub installed: bool,
    /// Why the check failed, if it did
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("one-shot".parse::<ExecutionMode>().unwrap(), ExecutionMode::OneShot);
        assert_eq!("interactive".parse::<ExecutionMode>().unwrap(), ExecutionMode::Interactive);
        assert!("batch".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn test_request_deserialization() {
        let request: ExecutionRequest =
            serde_json::from_str(r#"{"code": "print(1)", "sessionId": "s1", "mode": "interactive"}"#).unwrap();
        assert_eq!(request.source_text, "print(1)");
        assert_eq!(request.session_id.as_deref(), Some("s1"));
        assert_eq!(request.mode, ExecutionMode::Interactive);
    }

    #[test]
    fn test_request_validation_and_session() {
        assert!(ExecutionRequest::new("   \n", ExecutionMode::OneShot).validate().is_err());

        let request = ExecutionRequest::new("print(1)", ExecutionMode::OneShot).with_session("  ");
        assert!(request.validate().is_ok());
        let minted = request.resolve_session_id();
        assert_eq!(minted.len(), 36);

        let request = request.with_session("abc");
        assert_eq!(request.resolve_session_id(), "abc");
    }

    #[test]
    fn test_event_wire_format() {
        let event = StreamEvent::InputRequest { prompt: "Name: ".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "input_request");
        assert_eq!(json["prompt"], "Name: ");

        let start = serde_json::to_value(StreamEvent::Start { session_id: "s2".into() }).unwrap();
        assert_eq!(start["sessionId"], "s2");

        assert!(StreamEvent::Exit { code: 0 }.is_terminal());
        assert_eq!(StreamEvent::Output { data: "x".into() }.kind(), "output");
    }

    #[test]
    fn test_launch_failure_result() {
        let err = Error::InterpreterUnavailable("python3, python".into());
        let result = ExecutionResult::launch_failure("s1", &err);
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.failure_kind, Some(FailureKind::InterpreterUnavailable));
        assert!(result.is_launch_failure());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["exitCode"], -1);
        assert!(json.get("hint").is_none());
    }
}

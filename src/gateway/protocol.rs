//! HTTP request and response bodies
//!
//! All bodies are JSON with camelCase field names.

use serde::{Deserialize, Serialize};

use crate::runner::{ExecutionMode, ExecutionRequest, HealthReport, SessionInfo};

// ============================================================================
// Execution
// ============================================================================

/// Body of `/run` and `/run/stream`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Source text to execute
    #[serde(alias = "code")]
    pub source_text: String,
    /// Session id; minted when absent
    #[serde(default)]
    pub session_id: Option<String>,
}

impl RunRequest {
    /// Execution request for the given mode
    pub fn into_execution(self, mode: ExecutionMode) -> ExecutionRequest {
        ExecutionRequest {
            source_text: self.source_text,
            session_id: self.session_id,
            mode,
        }
    }
}

// ============================================================================
// Input and stop
// ============================================================================

/// Body of `/input`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRequest {
    pub session_id: String,
    /// Line written to the process's stdin; a newline is appended
    #[serde(alias = "input")]
    pub input_text: String,
}

/// Body of `/stop`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub session_id: String,
}

/// Response of `/stop`; `success` is always true
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    pub success: bool,
    /// Whether a live process was actually terminated
    pub stopped: bool,
}

/// Generic acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

// ============================================================================
// Modules
// ============================================================================

/// Body of `/modules/check`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulesCheckRequest {
    #[serde(alias = "modules")]
    pub module_names: Vec<String>,
}

// ============================================================================
// Status
// ============================================================================

/// Response of `/health`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(flatten)]
    pub report: HealthReport,
}

/// Response of `/sessions`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsResponse {
    pub count: usize,
    pub sessions: Vec<SessionInfo>,
}

/// Body of every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

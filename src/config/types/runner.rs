//! Runner configuration types
//!
//! Interpreter probing, artifact placement and dependency auditing.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Normalisation preamble prepended to every submitted program.
///
/// Forces UTF-8 on the standard streams and, on Windows consoles, switches
/// the output code page to UTF-8 as well. Failures are ignored so the
/// user's program always runs. The whole preamble is a single line, so a
/// traceback for line N of the submitted source reports line N + 1.
pub const DEFAULT_PREAMBLE: &str = r#"exec("import sys\ntry:\n    sys.stdout.reconfigure(encoding='utf-8')\n    sys.stderr.reconfigure(encoding='utf-8')\nexcept Exception:\n    pass\nif sys.platform == 'win32':\n    try:\n        import ctypes\n        ctypes.windll.kernel32.SetConsoleOutputCP(65001)\n    except Exception:\n        pass\n", {})
"#;

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Interpreter executables to probe, in order
    #[serde(default = "default_candidates")]
    pub interpreter_candidates: Vec<String>,
    /// Interpreter name used when no candidate passes its check
    #[serde(default = "default_fallback")]
    pub fallback_interpreter: String,
    /// Arguments for the version check
    #[serde(default = "default_probe_args")]
    pub probe_args: Vec<String>,
    /// Upper bound on a single version check
    #[serde(with = "humantime_serde", default = "default_probe_timeout")]
    pub probe_timeout: Duration,
    /// Directory for temporary source artifacts
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// File extension for artifacts (without the dot)
    #[serde(default = "default_extension")]
    pub artifact_extension: String,
    /// Text prepended to every submitted program
    #[serde(default = "default_preamble")]
    pub preamble: String,
    /// How long eviction waits for a terminated process to be reaped
    #[serde(with = "humantime_serde", default = "default_grace")]
    pub terminate_grace: Duration,
    /// Capacity of each interactive event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Dependency audit configuration
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            interpreter_candidates: default_candidates(),
            fallback_interpreter: default_fallback(),
            probe_args: default_probe_args(),
            probe_timeout: default_probe_timeout(),
            artifact_dir: default_artifact_dir(),
            artifact_extension: default_extension(),
            preamble: default_preamble(),
            terminate_grace: default_grace(),
            event_buffer: default_event_buffer(),
            audit: AuditConfig::default(),
        }
    }
}

fn default_candidates() -> Vec<String> {
    vec!["python3".to_string(), "python".to_string(), "py".to_string()]
}

fn default_fallback() -> String {
    "python3".to_string()
}

fn default_probe_args() -> Vec<String> {
    vec!["--version".to_string()]
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_artifact_dir() -> PathBuf {
    std::env::temp_dir().join("coderun")
}

fn default_extension() -> String {
    "py".to_string()
}

fn default_preamble() -> String {
    DEFAULT_PREAMBLE.to_string()
}

fn default_grace() -> Duration {
    Duration::from_secs(3)
}

fn default_event_buffer() -> usize {
    256
}

/// Dependency audit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Run the audit before execution
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Upper bound on a single import check
    #[serde(with = "humantime_serde", default = "default_check_timeout")]
    pub check_timeout: Duration,
    /// Module names treated as always available, on top of the standard library
    #[serde(default)]
    pub extra_builtins: Vec<String>,
    /// How long a successful import check is remembered
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub cache_ttl: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            enabled: true,
            check_timeout: default_check_timeout(),
            extra_builtins: Vec::new(),
            cache_ttl: default_cache_ttl(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_check_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(10 * 60)
}

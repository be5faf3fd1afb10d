//! Interpreter discovery
//!
//! Probes the configured candidate executables in order and picks the first
//! one whose version check exits zero. The result is advisory: the real
//! spawn can still fail, in which case the cached choice is dropped.

use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;

/// The interpreter chosen for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interpreter {
    /// Executable name or path
    pub program: String,
    /// Whether the version check passed
    pub available: bool,
}

/// Locates a working interpreter among the configured candidates
pub struct InterpreterLocator {
    candidates: Vec<String>,
    fallback: String,
    probe_args: Vec<String>,
    probe_timeout: Duration,
    cached: RwLock<Option<Interpreter>>,
}

impl InterpreterLocator {
    /// Create a locator from the runner configuration
    pub fn new(config: &RunnerConfig) -> Self {
        InterpreterLocator {
            candidates: config.interpreter_candidates.clone(),
            fallback: config.fallback_interpreter.clone(),
            probe_args: config.probe_args.clone(),
            probe_timeout: config.probe_timeout,
            cached: RwLock::new(None),
        }
    }

    /// Candidate names, in probe order
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Run the version check for one candidate
    pub async fn probe(&self, candidate: &str) -> bool {
        if which::which(candidate).is_err() {
            debug!("Interpreter candidate {} not found on PATH", candidate);
            return false;
        }

        let mut command = Command::new(candidate);
        command
            .args(&self.probe_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(self.probe_timeout, command.status()).await {
            Ok(Ok(status)) => {
                debug!("Probe of {} exited with {}", candidate, status);
                status.success()
            }
            Ok(Err(e)) => {
                debug!("Probe of {} failed to start: {}", candidate, e);
                false
            }
            Err(_) => {
                warn!("Probe of {} timed out after {:?}", candidate, self.probe_timeout);
                false
            }
        }
    }

    /// Select the first working candidate, falling back to the default name
    pub async fn locate(&self) -> Interpreter {
        if let Some(interpreter) = self.cached.read().await.clone() {
            return interpreter;
        }

        for candidate in &self.candidates {
            if self.probe(candidate).await {
                let interpreter = Interpreter {
                    program: candidate.clone(),
                    available: true,
                };
                info!("Using interpreter {}", candidate);
                *self.cached.write().await = Some(interpreter.clone());
                return interpreter;
            }
        }

        warn!(
            "No interpreter candidate passed its check ({}), falling back to {}",
            self.candidates.join(", "),
            self.fallback
        );
        Interpreter {
            program: self.fallback.clone(),
            available: false,
        }
    }

    /// Probe every candidate and return the ones that work
    pub async fn working_candidates(&self) -> Vec<String> {
        let mut working = Vec::new();
        for candidate in &self.candidates {
            if self.probe(candidate).await {
                working.push(candidate.clone());
            }
        }
        working
    }

    /// Forget the cached choice so the next call probes again
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

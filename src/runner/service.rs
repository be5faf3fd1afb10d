//! Runner service: the entry point used by the gateway and the CLI
//!
//! Wires the locator, preparer, auditor, registry and both runners together.
//! One instance per process; cloning shares the same registry.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RunnerConfig;
use crate::error::Result;
use crate::runner::audit::{has_import_syntax, DependencyAuditor};
use crate::runner::classify::{install_hint, install_hint_for};
use crate::runner::interactive::{EventStream, InteractiveRunner};
use crate::runner::interpreter::InterpreterLocator;
use crate::runner::oneshot::OneShotRunner;
use crate::runner::registry::{SessionInfo, SessionRegistry};
use crate::runner::source::SourcePreparer;
use crate::runner::types::{ExecutionRequest, ExecutionResult, ModuleStatus};

/// Interpreter and session status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Whether any candidate passed its version check
    pub interpreter_available: bool,
    /// The candidate runs will use, if one works
    pub interpreter: Option<String>,
    /// Every candidate that passed its version check
    pub candidates: Vec<String>,
    /// Number of sessions with a live process
    pub active_sessions: usize,
}

/// Executes submitted source in one-shot or interactive mode
#[derive(Clone)]
pub struct RunnerService {
    config: Arc<RunnerConfig>,
    locator: Arc<InterpreterLocator>,
    preparer: Arc<SourcePreparer>,
    auditor: Arc<DependencyAuditor>,
    registry: Arc<SessionRegistry>,
    oneshot: Arc<OneShotRunner>,
    interactive: Arc<InteractiveRunner>,
}

impl RunnerService {
    /// Build a service with a fresh, empty session registry
    pub fn new(config: RunnerConfig) -> Self {
        let locator = Arc::new(InterpreterLocator::new(&config));
        let auditor = Arc::new(DependencyAuditor::new(locator.clone(), &config.audit));
        let registry = Arc::new(SessionRegistry::new(config.terminate_grace));

        RunnerService {
            preparer: Arc::new(SourcePreparer::new(&config)),
            oneshot: Arc::new(OneShotRunner::new(registry.clone(), config.terminate_grace)),
            interactive: Arc::new(InteractiveRunner::new(
                registry.clone(),
                config.event_buffer,
                config.terminate_grace,
            )),
            config: Arc::new(config),
            locator,
            auditor,
            registry,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Run to completion and return the classified result
    ///
    /// The run lives on its own task, so dropping this future does not
    /// interrupt the process or skip its cleanup.
    pub async fn run_once(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        request.validate()?;
        let session_id = request.resolve_session_id();
        let service = self.clone();

        let result = tokio::spawn(async move { service.execute_once(request.source_text, session_id).await })
            .await?;
        Ok(result)
    }

    async fn execute_once(&self, source: String, session_id: String) -> ExecutionResult {
        let missing = self.auditor.audit(&source).await;
        if !missing.is_empty() {
            info!("Session {} references missing modules: {}", session_id, missing.join(", "));
        }

        let interpreter = self.locator.locate().await;
        let artifact = match self.preparer.prepare(&source, &session_id).await {
            Ok(artifact) => artifact,
            Err(e) => return ExecutionResult::launch_failure(&session_id, &e),
        };

        let mut result = self
            .oneshot
            .run_once(&interpreter, artifact, &session_id, has_import_syntax(&source))
            .await;

        if result.is_launch_failure() {
            self.locator.invalidate().await;
        }
        if result.hint.is_none() {
            result.hint = install_hint_for(&missing);
        }
        result.missing_modules = missing;
        result
    }

    /// Start an interactive run and return its event stream
    pub async fn run_interactive(&self, request: ExecutionRequest) -> Result<EventStream> {
        request.validate()?;
        let session_id = request.resolve_session_id();

        let notices: Vec<String> = self
            .auditor
            .audit(&request.source_text)
            .await
            .iter()
            .map(|module| install_hint(module))
            .collect();

        let interpreter = self.locator.locate().await;
        let artifact = self.preparer.prepare(&request.source_text, &session_id).await?;

        Ok(self
            .interactive
            .run_interactive(interpreter, artifact, session_id, notices))
    }

    /// Write one line to a session's running process
    pub async fn deliver_input(&self, session_id: &str, text: &str) -> Result<()> {
        self.interactive.deliver_input(session_id, text).await
    }

    /// Terminate a session's process if it has one; returns whether it did
    pub async fn stop(&self, session_id: &str) -> bool {
        let stopped = self.registry.evict(session_id).await;
        debug!("Stop for session {}: {}", session_id, if stopped { "terminated" } else { "nothing running" });
        stopped
    }

    /// Import-check each named module
    pub async fn check_modules(&self, names: &[String]) -> BTreeMap<String, ModuleStatus> {
        self.auditor.check_modules(names).await
    }

    /// Probe every interpreter candidate and count live sessions
    pub async fn health(&self) -> HealthReport {
        let candidates = self.locator.working_candidates().await;
        HealthReport {
            interpreter_available: !candidates.is_empty(),
            interpreter: candidates.first().cloned(),
            candidates,
            active_sessions: self.registry.len().await,
        }
    }

    /// Live sessions, oldest first
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.list().await
    }

    /// Terminate every live session
    pub async fn shutdown(&self) -> usize {
        let evicted = self.registry.evict_all().await;
        if evicted > 0 {
            info!("Terminated {} live session(s) on shutdown", evicted);
        }
        evicted
    }
}


#[cfg(test)]
mod tests {
    use super::testing::sh_config;
    use super::*;
    use crate::error::Error;
    use crate::runner::types::{ExecutionMode, StreamEvent};
    use futures::StreamExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_run_once_mints_session() {
        let dir = tempdir().unwrap();
        let service = RunnerService::new(sh_config(dir.path()));

        let result = service
            .run_once(ExecutionRequest::new("echo hi", ExecutionMode::OneShot))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hi");
        assert_eq!(result.session_id.len(), 36);
        assert!(result.missing_modules.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_run_once_rejects_empty_source() {
        let dir = tempdir().unwrap();
        let service = RunnerService::new(sh_config(dir.path()));

        let err = service
            .run_once(ExecutionRequest::new("  ", ExecutionMode::OneShot))
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_unavailable_interpreter() {
        let dir = tempdir().unwrap();
        let config = RunnerConfig {
            interpreter_candidates: vec!["coderun-no-such-interpreter".to_string()],
            fallback_interpreter: "coderun-no-such-interpreter".to_string(),
            ..sh_config(dir.path())
        };
        let service = RunnerService::new(config);

        let result = service
            .run_once(ExecutionRequest::new("echo hi", ExecutionMode::OneShot).with_session("s1"))
            .await
            .unwrap();
        assert!(result.is_launch_failure());
        assert!(result.error.contains("No working interpreter"));

        let health = service.health().await;
        assert!(!health.interpreter_available);
        assert!(health.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_interactive_roundtrip() {
        let dir = tempdir().unwrap();
        let service = RunnerService::new(sh_config(dir.path()));
        let request = ExecutionRequest::new("printf 'Name: '\nread n\necho \"Hi $n\"", ExecutionMode::Interactive)
            .with_session("s2");

        let mut stream = service.run_interactive(request).await.unwrap();
        assert_eq!(stream.session_id(), "s2");
        loop {
            match stream.recv().await {
                Some(StreamEvent::InputRequest { prompt }) => {
                    assert_eq!(prompt, "Name: ");
                    break;
                }
                Some(_) => {}
                None => panic!("stream ended before the prompt"),
            }
        }
        service.deliver_input("s2", "Ada").await.unwrap();

        let rest: Vec<StreamEvent> = stream.collect().await;
        assert!(rest.contains(&StreamEvent::Output { data: "Hi Ada\n".into() }));
        assert_eq!(rest.last(), Some(&StreamEvent::Exit { code: 0 }));
    }

    fn python_available() -> bool {
        which::which("python3").is_ok()
    }

    fn python_config(dir: &std::path::Path) -> RunnerConfig {
        RunnerConfig {
            artifact_dir: dir.to_path_buf(),
            ..RunnerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_python_one_shot_and_interactive() {
        if !python_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let service = RunnerService::new(python_config(dir.path()));

        let result = service
            .run_once(ExecutionRequest::new("print(\"hi\")", ExecutionMode::OneShot))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hi");
        assert_eq!(result.exit_code, 0);

        let request = ExecutionRequest::new(
            "name = input(\"Name: \")\nprint(f\"Hi {name}\")",
            ExecutionMode::Interactive,
        )
        .with_session("py");
        let mut stream = service.run_interactive(request).await.unwrap();
        assert_eq!(stream.recv().await, Some(StreamEvent::Start { session_id: "py".into() }));
        assert_eq!(stream.recv().await, Some(StreamEvent::Output { data: "Name: ".into() }));
        assert_eq!(stream.recv().await, Some(StreamEvent::InputRequest { prompt: "Name: ".into() }));

        service.deliver_input("py", "Ada").await.unwrap();
        let rest: Vec<StreamEvent> = stream.collect().await;
        let output: String = rest
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Output { data } => Some(data.as_str()),
                _ => None,
            })
            .collect();
        assert!(output.contains("Hi Ada"));
        assert_eq!(rest.last(), Some(&StreamEvent::Exit { code: 0 }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_python_traceback_line_offset() {
        if !python_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let service = RunnerService::new(python_config(dir.path()));

        let result = service
            .run_once(ExecutionRequest::new("x = 1\nraise ValueError(\"boom\")", ExecutionMode::OneShot))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.contains("line 3"));
        assert!(result.error.contains("ValueError: boom"));
    }

    #[tokio::test]
    async fn test_input_and_stop_for_unknown_session() {
        let dir = tempdir().unwrap();
        let service = RunnerService::new(sh_config(dir.path()));

        let err = service.deliver_input("ghost", "x").await.unwrap_err();
        assert!(matches!(err, Error::NoActiveProcess(_)));
        assert!(!service.stop("ghost").await);
        assert!(!service.stop("ghost").await);
    }

    #[tokio::test]
    async fn test_health_and_shutdown() {
        let dir = tempdir().unwrap();
        let service = RunnerService::new(sh_config(dir.path()));

        let mut stream = service
            .run_interactive(ExecutionRequest::new("exec sleep 30", ExecutionMode::Interactive).with_session("s1"))
            .await
            .unwrap();
        assert_eq!(stream.recv().await.map(|e| e.kind()), Some("start"));

        let health = service.health().await;
        assert!(health.interpreter_available);
        assert_eq!(health.interpreter.as_deref(), Some("sh"));
        assert_eq!(health.active_sessions, 1);
        assert_eq!(service.sessions().await[0].session_id, "s1");

        assert_eq!(service.shutdown().await, 1);
        assert_eq!(stream.recv().await, Some(StreamEvent::Exit { code: -1 }));
        assert_eq!(service.health().await.active_sessions, 0);
    }
}

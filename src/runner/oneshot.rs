//! One-shot runner: execute to completion and return one result

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::runner::classify::{classify, CapturedRun};
use crate::runner::interpreter::Interpreter;
use crate::runner::process::{exit_code, kill_and_reap, read_all, spawn_registered};
use crate::runner::registry::SessionRegistry;
use crate::runner::source::Artifact;
use crate::runner::types::{ExecutionMode, ExecutionResult};

/// Error text for a run terminated by a stop request or a newer run
pub const STOPPED_MESSAGE: &str = "Process was stopped before it finished";

/// Runs prepared artifacts to completion
pub struct OneShotRunner {
    registry: Arc<SessionRegistry>,
    drain_timeout: Duration,
}

impl OneShotRunner {
    pub fn new(registry: Arc<SessionRegistry>, drain_timeout: Duration) -> Self {
        OneShotRunner {
            registry,
            drain_timeout,
        }
    }

    /// Run `artifact` and classify the outcome
    ///
    /// There is no execution timeout; the run ends when the process exits or
    /// the session is evicted. The artifact is removed before this returns.
    pub async fn run_once(
        &self,
        interpreter: &Interpreter,
        artifact: Artifact,
        session_id: &str,
        has_imports: bool,
    ) -> ExecutionResult {
        let (mut child, handle) = match spawn_registered(
            &self.registry,
            interpreter,
            &artifact,
            session_id,
            ExecutionMode::OneShot,
        )
        .await
        {
            Ok(spawned) => spawned,
            Err(e) => {
                drop(artifact);
                return ExecutionResult::launch_failure(session_id, &e);
            }
        };

        let stdout = child.stdout.take().map(|pipe| tokio::spawn(read_all(pipe)));
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(read_all(pipe)));

        let cancel = handle.cancellation();
        let (status, stopped) = tokio::select! {
            status = child.wait() => (status.ok(), false),
            _ = cancel.cancelled() => {
                info!("One-shot run for session {} stopped", session_id);
                (kill_and_reap(&mut child).await, true)
            }
        };

        let drain = if stopped { Some(self.drain_timeout) } else { None };
        let stdout = collect(stdout, drain).await;
        let mut stderr = collect(stderr, drain).await;

        handle.mark_exited().await;
        self.registry.release(session_id, handle.run_id()).await;
        drop(artifact);

        let code = exit_code(status);
        debug!("One-shot run for session {} exited with {}", session_id, code);

        if stopped && stderr.trim().is_empty() {
            stderr = STOPPED_MESSAGE.to_string();
        }

        classify(
            CapturedRun {
                stdout,
                stderr,
                exit_code: code,
            },
            session_id,
            has_imports,
        )
    }
}

/// Wait for a pipe reader, bounded when the process was killed
async fn collect(task: Option<JoinHandle<String>>, limit: Option<Duration>) -> String {
    let Some(mut task) = task else {
        return String::new();
    };

    let joined = match limit {
        None => (&mut task).await,
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("Pipe still open {:?} after kill; dropping remaining output", limit);
                task.abort();
                return String::new();
            }
        },
    };

    joined.unwrap_or_else(|e| {
        warn!("Pipe reader failed: {}", e);
        String::new()
    })
}

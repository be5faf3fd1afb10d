//! Spawning and reaping interpreter processes

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::runner::interpreter::Interpreter;
use crate::runner::registry::{ProcessHandle, SessionRegistry};
use crate::runner::source::Artifact;
use crate::runner::types::ExecutionMode;

/// Command running `artifact` under `interpreter` with all stdio captured
pub fn command_for(interpreter: &Interpreter, artifact: &Artifact) -> Command {
    let mut command = Command::new(&interpreter.program);
    command
        .arg(artifact.path())
        .env("PYTHONIOENCODING", "utf-8")
        .env("PYTHONUNBUFFERED", "1")
        .env("PYTHONUTF8", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    command
}

/// Evict the session's previous run, spawn a new process and register it
///
/// In one-shot mode stdin is closed straight away so reads see end-of-file.
pub async fn spawn_registered(
    registry: &SessionRegistry,
    interpreter: &Interpreter,
    artifact: &Artifact,
    session_id: &str,
    mode: ExecutionMode,
) -> Result<(Child, Arc<ProcessHandle>)> {
    if registry.evict(session_id).await {
        debug!("Terminated previous run of session {}", session_id);
    }

    let mut child = command_for(interpreter, artifact)
        .spawn()
        .map_err(|e| spawn_error(interpreter, e))?;

    let stdin = child.stdin.take();
    let stdin = match mode {
        ExecutionMode::Interactive => stdin,
        ExecutionMode::OneShot => None,
    };

    let handle = Arc::new(ProcessHandle::new(session_id, mode, child.id(), stdin));
    registry.register(handle.clone()).await;

    info!(
        "Started {} run {} for session {} (pid {:?}, {})",
        mode,
        handle.run_id(),
        session_id,
        child.id(),
        interpreter.program
    );
    Ok((child, handle))
}

fn spawn_error(interpreter: &Interpreter, err: std::io::Error) -> Error {
    warn!("Failed to spawn {}: {}", interpreter.program, err);
    if interpreter.available {
        Error::Spawn {
            program: interpreter.program.clone(),
            reason: err.to_string(),
        }
    } else {
        Error::InterpreterUnavailable(interpreter.program.clone())
    }
}

/// Kill the child and wait for it, returning its exit status if it could be reaped
pub async fn kill_and_reap(child: &mut Child) -> Option<ExitStatus> {
    if let Err(e) = child.kill().await {
        debug!("kill failed (process may have exited already): {}", e);
    }
    match child.wait().await {
        Ok(status) => Some(status),
        Err(e) => {
            warn!("Failed to reap killed process: {}", e);
            None
        }
    }
}

/// Exit code of a finished process, -1 when terminated by a signal
pub fn exit_code(status: Option<ExitStatus>) -> i32 {
    status.and_then(|s| s.code()).unwrap_or(-1)
}

/// Read a pipe to the end, decoding lossily
pub async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!("pipe read ended early: {}", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

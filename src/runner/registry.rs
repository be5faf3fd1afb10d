//! Session registry
//!
//! Maps session ids to the handle of their live process. This is the only
//! shared mutable structure in the runner and the one place that enforces
//! "at most one live process per session": registering a run terminates
//! whatever was registered under the same id before.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::runner::types::ExecutionMode;

/// Snapshot of a registered session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub run_id: Uuid,
    pub mode: ExecutionMode,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

/// Handle to one running process, owned by the registry
///
/// The process itself is owned by the task supervising it; the handle lets
/// other requests write to its stdin or ask for termination.
#[derive(Debug)]
pub struct ProcessHandle {
    run_id: Uuid,
    session_id: String,
    mode: ExecutionMode,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    stdin: Mutex<Option<ChildStdin>>,
    cancel: CancellationToken,
    exited: CancellationToken,
}

impl ProcessHandle {
    /// Create a handle for a freshly spawned process
    pub fn new(
        session_id: impl Into<String>,
        mode: ExecutionMode,
        pid: Option<u32>,
        stdin: Option<ChildStdin>,
    ) -> Self {
        ProcessHandle {
            run_id: Uuid::new_v4(),
            session_id: session_id.into(),
            mode,
            pid,
            started_at: Utc::now(),
            stdin: Mutex::new(stdin),
            cancel: CancellationToken::new(),
            exited: CancellationToken::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Cancelled when someone asks for the process to be terminated
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the process has not been reaped yet
    pub fn is_alive(&self) -> bool {
        !self.exited.is_cancelled()
    }

    /// Record that the process has exited and close its stdin
    pub async fn mark_exited(&self) {
        self.exited.cancel();
        self.stdin.lock().await.take();
    }

    /// Write one line to the process's standard input
    pub async fn write_line(&self, text: &str) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::NoActiveProcess(self.session_id.clone()));
        }

        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| Error::NoActiveProcess(self.session_id.clone()))?;

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        };
        if let Err(e) = written.await {
            debug!("stdin write for session {} failed: {}", self.session_id, e);
            guard.take();
            return Err(Error::StdinClosed(self.session_id.clone()));
        }
        Ok(())
    }

    /// Ask the supervisor to kill the process and wait, bounded, until it is reaped
    pub async fn terminate(&self, grace: Duration) {
        self.cancel.cancel();
        if tokio::time::timeout(grace, self.exited.cancelled()).await.is_err() {
            warn!(
                "Process for session {} (run {}) not reaped within {:?}",
                self.session_id, self.run_id, grace
            );
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            run_id: self.run_id,
            mode: self.mode,
            pid: self.pid,
            started_at: self.started_at,
        }
    }
}

/// Concurrent map from session id to live process handle
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<ProcessHandle>>>,
    grace: Duration,
}

impl SessionRegistry {
    /// Create an empty registry; `grace` bounds how long eviction waits for a kill
    pub fn new(grace: Duration) -> Self {
        SessionRegistry {
            sessions: Mutex::new(HashMap::new()),
            grace,
        }
    }

    /// Register a handle, terminating any previous process for the same session
    pub async fn register(&self, handle: Arc<ProcessHandle>) {
        let previous = {
            let mut sessions = self.sessions.lock().await;
            let previous = sessions.remove(handle.session_id());
            sessions.insert(handle.session_id().to_string(), handle.clone());
            previous
        };

        if let Some(previous) = previous {
            info!(
                "Session {} re-registered; terminating previous run {}",
                handle.session_id(),
                previous.run_id()
            );
            previous.terminate(self.grace).await;
        }
    }

    /// Current handle for a session
    pub async fn lookup(&self, session_id: &str) -> Option<Arc<ProcessHandle>> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Remove a session and terminate its process. Returns whether one was registered.
    pub async fn evict(&self, session_id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(session_id);
        match removed {
            Some(handle) => {
                info!("Evicting session {} (run {})", session_id, handle.run_id());
                handle.terminate(self.grace).await;
                true
            }
            None => false,
        }
    }

    /// Drop the entry for a finished run, unless a newer run has replaced it
    pub async fn release(&self, session_id: &str, run_id: Uuid) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(session_id) {
            Some(current) if current.run_id() == run_id => {
                sessions.remove(session_id);
                debug!("Released session {} (run {})", session_id, run_id);
                true
            }
            _ => false,
        }
    }

    /// Evict every session. Returns how many were running.
    pub async fn evict_all(&self) -> usize {
        let handles: Vec<Arc<ProcessHandle>> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, handle)| handle).collect()
        };
        let count = handles.len();
        futures::future::join_all(handles.iter().map(|h| h.terminate(self.grace))).await;
        count
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Snapshot of all registered sessions, oldest first
    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .lock()
            .await
            .values()
            .map(|h| h.info())
            .collect();
        infos.sort_by_key(|info| info.started_at);
        infos
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    /// Spawn `sleep` and supervise it the way the runners do
    fn spawn_sleeper(session_id: &str) -> (Arc<ProcessHandle>, tokio::task::JoinHandle<()>) {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let stdin = child.stdin.take();
        let handle = Arc::new(ProcessHandle::new(
            session_id,
            ExecutionMode::Interactive,
            child.id(),
            stdin,
        ));

        let supervised = handle.clone();
        let task = tokio::spawn(async move {
            let cancel = supervised.cancellation();
            tokio::select! {
                _ = child.wait() => {}
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                }
            }
            supervised.mark_exited().await;
        });
        (handle, task)
    }

    #[tokio::test]
    async fn test_register_lookup_evict() {
        let registry = SessionRegistry::default();
        let (handle, task) = spawn_sleeper("s1");

        registry.register(handle.clone()).await;
        assert!(registry.lookup("s1").await.is_some());
        assert_eq!(registry.len().await, 1);

        assert!(registry.evict("s1").await);
        assert!(registry.lookup("s1").await.is_none());
        assert!(!handle.is_alive());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_reregister_terminates_previous() {
        let registry = SessionRegistry::default();
        let (first, first_task) = spawn_sleeper("s1");
        let (second, second_task) = spawn_sleeper("s1");

        registry.register(first.clone()).await;
        registry.register(second.clone()).await;

        assert!(!first.is_alive());
        assert!(second.is_alive());
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.lookup("s1").await.unwrap().run_id(), second.run_id());

        first_task.await.unwrap();
        registry.evict_all().await;
        second_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_release_ignores_replaced_run() {
        let registry = SessionRegistry::default();
        let stale = Arc::new(ProcessHandle::new("s1", ExecutionMode::OneShot, None, None));
        let current = Arc::new(ProcessHandle::new("s1", ExecutionMode::OneShot, None, None));
        stale.mark_exited().await;
        current.mark_exited().await;

        registry.register(current.clone()).await;
        assert!(!registry.release("s1", stale.run_id()).await);
        assert!(registry.lookup("s1").await.is_some());

        assert!(registry.release("s1", current.run_id()).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_evict_unknown_session() {
        let registry = SessionRegistry::default();
        assert!(!registry.evict("nobody").await);
    }

    #[tokio::test]
    async fn test_write_line_after_exit_fails() {
        let handle = ProcessHandle::new("s1", ExecutionMode::Interactive, None, None);
        handle.mark_exited().await;

        let err = handle.write_line("hello").await.unwrap_err();
        assert!(matches!(err, Error::NoActiveProcess(_)));
    }

    #[tokio::test]
    async fn test_write_line_reaches_process() {
        let (handle, task) = spawn_sleeper("s1");
        handle.write_line("ignored by sleep").await.unwrap();
        handle.terminate(Duration::from_secs(3)).await;
        task.await.unwrap();
        assert!(!handle.is_alive());
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let registry = SessionRegistry::default();
        let (a, a_task) = spawn_sleeper("a");
        let (b, b_task) = spawn_sleeper("b");
        registry.register(a).await;
        registry.register(b).await;

        let ids: Vec<String> = registry.list().await.into_iter().map(|i| i.session_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"a".to_string()));

        assert_eq!(registry.evict_all().await, 2);
        assert!(registry.is_empty().await);
        a_task.await.unwrap();
        b_task.await.unwrap();
    }
}

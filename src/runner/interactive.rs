//! Interactive runner
//!
//! Streams a process's output as [`StreamEvent`]s while it runs and accepts
//! input lines through the session registry. A supervisor task owns the
//! child; the caller only holds the receiving end of the event channel, and
//! dropping it terminates the process.

use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::runner::interpreter::Interpreter;
use crate::runner::process::{exit_code, kill_and_reap, spawn_registered};
use crate::runner::registry::SessionRegistry;
use crate::runner::source::Artifact;
use crate::runner::types::{ExecutionMode, StreamEvent};

const READ_CHUNK: usize = 4096;

/// Guess whether a chunk of output ends in a prompt
///
/// Looks at the last non-empty line only. Returns that line untouched when it
/// ends with `:` or `?` or mentions "enter". Advisory: output is always
/// forwarded whether or not this matches.
pub fn detect_input_request(chunk: &str) -> Option<String> {
    let line = chunk
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .filter(|l| !l.trim().is_empty())
        .last()?;

    let trimmed = line.trim_end();
    if trimmed.ends_with(':') || trimmed.ends_with('?') || line.to_lowercase().contains("enter") {
        Some(line.to_string())
    } else {
        None
    }
}

/// Incremental UTF-8 decoder that carries split sequences across reads
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode as much of `bytes` (plus any carried-over prefix) as possible
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::new();
        let mut start = 0;
        while start < self.pending.len() {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..start + valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start += valid + len;
                        }
                        None => {
                            start += valid;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Flush whatever is left at end of stream
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Events of one interactive run, ending with `exit`
pub struct EventStream {
    session_id: String,
    rx: mpsc::Receiver<StreamEvent>,
}

impl EventStream {
    /// Session the run belongs to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next event, or `None` once the run has finished
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdout,
    Stderr,
}

/// Runs prepared artifacts interactively
pub struct InteractiveRunner {
    registry: Arc<SessionRegistry>,
    buffer: usize,
    drain_timeout: Duration,
}

impl InteractiveRunner {
    pub fn new(registry: Arc<SessionRegistry>, buffer: usize, drain_timeout: Duration) -> Self {
        InteractiveRunner {
            registry,
            buffer: buffer.max(1),
            drain_timeout,
        }
    }

    /// Start `artifact` and return its event stream
    ///
    /// `notices` are sent as `error` events right after `start`. Never blocks
    /// on the process; a launch failure shows up in the stream.
    pub fn run_interactive(
        &self,
        interpreter: Interpreter,
        artifact: Artifact,
        session_id: String,
        notices: Vec<String>,
    ) -> EventStream {
        let (tx, rx) = mpsc::channel(self.buffer);
        let supervisor = Supervisor {
            registry: self.registry.clone(),
            drain_timeout: self.drain_timeout,
            session_id: session_id.clone(),
            tx,
        };
        tokio::spawn(supervisor.run(interpreter, artifact, notices));

        EventStream { session_id, rx }
    }

    /// Write `text` plus a newline to the session's running process
    pub async fn deliver_input(&self, session_id: &str, text: &str) -> Result<()> {
        let handle = self
            .registry
            .lookup(session_id)
            .await
            .ok_or_else(|| Error::NoActiveProcess(session_id.to_string()))?;
        handle.write_line(text).await?;
        debug!("Delivered {} bytes of input to session {}", text.len() + 1, session_id);
        Ok(())
    }
}

struct Supervisor {
    registry: Arc<SessionRegistry>,
    drain_timeout: Duration,
    session_id: String,
    tx: mpsc::Sender<StreamEvent>,
}

impl Supervisor {
    async fn send(&self, event: StreamEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    async fn run(self, interpreter: Interpreter, artifact: Artifact, notices: Vec<String>) {
        let spawned = spawn_registered(
            &self.registry,
            &interpreter,
            &artifact,
            &self.session_id,
            ExecutionMode::Interactive,
        )
        .await;

        self.send(StreamEvent::Start {
            session_id: self.session_id.clone(),
        })
        .await;
        for notice in notices {
            self.send(StreamEvent::Error { data: notice }).await;
        }

        let (mut child, handle) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                drop(artifact);
                self.send(StreamEvent::Error { data: e.to_string() }).await;
                self.send(StreamEvent::Exit { code: -1 }).await;
                return;
            }
        };

        let exited = CancellationToken::new();
        let drain = self.drain_timeout;
        let pumps: Vec<JoinHandle<()>> = [
            child
                .stdout
                .take()
                .map(|p| tokio::spawn(pump(p, self.tx.clone(), Pipe::Stdout, exited.clone(), drain))),
            child
                .stderr
                .take()
                .map(|p| tokio::spawn(pump(p, self.tx.clone(), Pipe::Stderr, exited.clone(), drain))),
        ]
        .into_iter()
        .flatten()
        .collect();

        let cancel = handle.cancellation();
        let status = tokio::select! {
            status = child.wait() => status.ok(),
            _ = cancel.cancelled() => {
                info!("Interactive run for session {} stopped", self.session_id);
                kill_and_reap(&mut child).await
            }
            _ = self.tx.closed() => {
                info!("Client for session {} disconnected; terminating", self.session_id);
                kill_and_reap(&mut child).await
            }
        };

        handle.mark_exited().await;
        exited.cancel();
        for task in pumps {
            if let Err(e) = task.await {
                warn!("Output pump of session {} failed: {}", self.session_id, e);
            }
        }

        self.registry.release(&self.session_id, handle.run_id()).await;
        drop(artifact);

        let code = exit_code(status);
        info!("Interactive run for session {} exited with {}", self.session_id, code);
        self.send(StreamEvent::Exit { code }).await;
    }
}

/// Forward one pipe until end of stream
///
/// Sends wait for the consumer without limit. Once `exited` fires, the
/// remaining reads share a single `drain_timeout` deadline, which covers a
/// pipe held open by a grandchild process. Data already sitting in the pipe
/// is read even when that deadline has passed.
async fn pump<R: AsyncRead + Unpin>(
    mut reader: R,
    tx: mpsc::Sender<StreamEvent>,
    pipe: Pipe,
    exited: CancellationToken,
    drain_timeout: Duration,
) {
    let mut decoder = Utf8Decoder::default();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut deadline: Option<Instant> = None;

    loop {
        let read = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, reader.read(&mut buf)).await {
                Ok(read) => read,
                Err(_) => {
                    warn!("{:?} still open {:?} after exit; closing", pipe, drain_timeout);
                    break;
                }
            },
            None => tokio::select! {
                biased;
                read = reader.read(&mut buf) => read,
                _ = exited.cancelled() => {
                    deadline = Some(Instant::now() + drain_timeout);
                    continue;
                }
            },
        };
        let text = match read {
            Ok(0) => break,
            Ok(n) => decoder.decode(&buf[..n]),
            Err(e) => {
                debug!("{:?} read failed: {}", pipe, e);
                break;
            }
        };
        if !text.is_empty() && !forward(&tx, pipe, text).await {
            return;
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        forward(&tx, pipe, rest).await;
    }
}

async fn forward(tx: &mpsc::Sender<StreamEvent>, pipe: Pipe, text: String) -> bool {
    match pipe {
        Pipe::Stderr => tx.send(StreamEvent::Error { data: text }).await.is_ok(),
        Pipe::Stdout => {
            let prompt = detect_input_request(&text);
            if tx.send(StreamEvent::Output { data: text }).await.is_err() {
                return false;
            }
            match prompt {
                Some(prompt) => tx.send(StreamEvent::InputRequest { prompt }).await.is_ok(),
                None => true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;
    use crate::runner::source::SourcePreparer;
    use futures::StreamExt;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        preparer: SourcePreparer,
        registry: Arc<SessionRegistry>,
        runner: InteractiveRunner,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let config = RunnerConfig {
            artifact_dir: dir.path().to_path_buf(),
            preamble: String::new(),
            artifact_extension: "sh".to_string(),
            ..RunnerConfig::default()
        };
        let registry = Arc::new(SessionRegistry::default());
        Fixture {
            _dir: dir,
            preparer: SourcePreparer::new(&config),
            registry: registry.clone(),
            runner: InteractiveRunner::new(registry, 64, Duration::from_secs(1)),
        }
    }

    fn sh() -> Interpreter {
        Interpreter {
            program: "sh".to_string(),
            available: true,
        }
    }

    async fn next(stream: &mut EventStream) -> StreamEvent {
        tokio::time::timeout(Duration::from_secs(10), stream.recv())
            .await
            .expect("event within timeout")
            .expect("stream still open")
    }

    #[test]
    fn test_detect_input_request() {
        assert_eq!(detect_input_request("Enter your name: "), Some("Enter your name: ".to_string()));
        assert_eq!(detect_input_request("Name: "), Some("Name: ".to_string()));
        assert_eq!(detect_input_request("hello\nAge?\n\n"), Some("Age?".to_string()));
        assert_eq!(detect_input_request("Please ENTER a value\r\n"), Some("Please ENTER a value".to_string()));
        assert_eq!(detect_input_request("Hi Ada\n"), None);
        assert_eq!(detect_input_request("\n  \n"), None);
    }

    #[test]
    fn test_utf8_decoder_carries_split_sequence() {
        let bytes = "héllo".as_bytes();
        let mut decoder = Utf8Decoder::default();
        let first = decoder.decode(&bytes[..2]);
        let second = decoder.decode(&bytes[2..]);
        assert_eq!(first, "h");
        assert_eq!(second, "éllo");
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_utf8_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
        assert_eq!(decoder.decode(b"\xe2\x82"), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[tokio::test]
    async fn test_prompt_input_and_exit() {
        let f = fixture();
        let script = "printf 'Enter your name: '\nread name\necho \"Hi $name\"\n";
        let artifact = f.preparer.prepare(script, "s2").await.unwrap();
        let path = artifact.path().to_path_buf();
        let mut stream = f.runner.run_interactive(sh(), artifact, "s2".to_string(), Vec::new());

        assert_eq!(next(&mut stream).await, StreamEvent::Start { session_id: "s2".into() });
        assert_eq!(next(&mut stream).await, StreamEvent::Output { data: "Enter your name: ".into() });
        assert_eq!(
            next(&mut stream).await,
            StreamEvent::InputRequest { prompt: "Enter your name: ".into() }
        );

        f.runner.deliver_input("s2", "Ada").await.unwrap();

        let mut output = String::new();
        let code = loop {
            match next(&mut stream).await {
                StreamEvent::Output { data } => output.push_str(&data),
                StreamEvent::Exit { code } => break code,
                _ => {}
            }
        };
        assert!(output.contains("Hi Ada"));
        assert_eq!(code, 0);
        assert!(stream.recv().await.is_none());
        assert!(!path.exists());
        assert!(f.registry.lookup("s2").await.is_none());

        let err = f.runner.deliver_input("s2", "again").await.unwrap_err();
        assert!(matches!(err, Error::NoActiveProcess(_)));
    }

    #[tokio::test]
    async fn test_stderr_becomes_error_events() {
        let f = fixture();
        let artifact = f.preparer.prepare("echo oops >&2\nexit 5", "s1").await.unwrap();
        let path = artifact.path().to_path_buf();
        let events: Vec<StreamEvent> = f
            .runner
            .run_interactive(sh(), artifact, "s1".to_string(), vec!["notice".into()])
            .collect()
            .await;

        assert_eq!(events[0].kind(), "start");
        assert_eq!(events[1], StreamEvent::Error { data: "notice".into() });
        assert!(events.contains(&StreamEvent::Error { data: "oops\n".into() }));
        assert_eq!(events.last(), Some(&StreamEvent::Exit { code: 5 }));
        assert!(!path.exists());
        assert!(f.registry.lookup("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_slow_consumer_receives_all_output() {
        let dir = tempdir().unwrap();
        let config = RunnerConfig {
            artifact_dir: dir.path().to_path_buf(),
            preamble: String::new(),
            artifact_extension: "sh".to_string(),
            ..RunnerConfig::default()
        };
        let preparer = SourcePreparer::new(&config);
        let runner = InteractiveRunner::new(Arc::new(SessionRegistry::default()), 4, Duration::from_millis(100));

        let script = "i=0\nwhile [ $i -lt 2000 ]; do echo line$i; i=$((i+1)); done";
        let artifact = preparer.prepare(script, "s1").await.unwrap();
        let path = artifact.path().to_path_buf();
        let mut stream = runner.run_interactive(sh(), artifact, "s1".to_string(), Vec::new());

        assert_eq!(next(&mut stream).await.kind(), "start");
        tokio::time::sleep(Duration::from_millis(800)).await;

        let mut output = String::new();
        let code = loop {
            match next(&mut stream).await {
                StreamEvent::Output { data } => output.push_str(&data),
                StreamEvent::Exit { code } => break code,
                other => panic!("unexpected event {:?}", other),
            }
        };
        assert_eq!(code, 0);
        assert_eq!(output.lines().count(), 2000);
        assert!(output.ends_with("line1999\n"));
        assert!(stream.recv().await.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_spawn_failure_stream() {
        let f = fixture();
        let artifact = f.preparer.prepare("echo hi", "s1").await.unwrap();
        let path = artifact.path().to_path_buf();
        let missing = Interpreter {
            program: "coderun-no-such-interpreter".to_string(),
            available: true,
        };

        let events: Vec<StreamEvent> = f
            .runner
            .run_interactive(missing, artifact, "s1".to_string(), Vec::new())
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind(), "start");
        assert_eq!(events[1].kind(), "error");
        assert_eq!(events[2], StreamEvent::Exit { code: -1 });
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_disconnect_terminates_process() {
        let f = fixture();
        let artifact = f.preparer.prepare("exec sleep 30", "s1").await.unwrap();
        let path = artifact.path().to_path_buf();
        let mut stream = f.runner.run_interactive(sh(), artifact, "s1".to_string(), Vec::new());

        assert_eq!(next(&mut stream).await.kind(), "start");
        assert!(f.registry.lookup("s1").await.is_some());
        drop(stream);

        let cleaned = tokio::time::timeout(Duration::from_secs(10), async {
            while f.registry.lookup("s1").await.is_some() || path.exists() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(cleaned.is_ok());
    }

    #[tokio::test]
    async fn test_new_run_replaces_previous() {
        let f = fixture();
        let first = f.preparer.prepare("exec sleep 30", "s1").await.unwrap();
        let mut first_stream = f.runner.run_interactive(sh(), first, "s1".to_string(), Vec::new());
        assert_eq!(next(&mut first_stream).await.kind(), "start");

        let second = f.preparer.prepare("exec sleep 30", "s1").await.unwrap();
        let mut second_stream = f.runner.run_interactive(sh(), second, "s1".to_string(), Vec::new());
        assert_eq!(next(&mut second_stream).await.kind(), "start");

        assert_eq!(next(&mut first_stream).await, StreamEvent::Exit { code: -1 });
        assert_eq!(f.registry.len().await, 1);

        assert!(f.registry.evict("s1").await);
        assert_eq!(next(&mut second_stream).await, StreamEvent::Exit { code: -1 });
    }
}

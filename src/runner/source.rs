//! Source preparation
//!
//! Writes the preamble plus the submitted source to a uniquely named file.
//! The returned [`Artifact`] deletes that file when dropped, so every exit
//! path of a run cleans up after itself.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::RunnerConfig;
use crate::error::Result;

const MAX_SESSION_FRAGMENT: usize = 48;

/// A prepared source file on disk, removed on drop
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
}

impl Artifact {
    /// Path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed artifact {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove artifact {}: {}", self.path.display(), e),
        }
    }
}

/// Materialises submitted source as temporary artifacts
pub struct SourcePreparer {
    dir: PathBuf,
    extension: String,
    preamble: String,
    counter: AtomicU64,
}

impl SourcePreparer {
    /// Create a preparer from the runner configuration
    pub fn new(config: &RunnerConfig) -> Self {
        SourcePreparer {
            dir: config.artifact_dir.clone(),
            extension: config.artifact_extension.clone(),
            preamble: config.preamble.clone(),
            counter: AtomicU64::new(0),
        }
    }

    /// Directory artifacts are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Preamble followed by the caller's source
    pub fn compose(&self, source: &str) -> String {
        if self.preamble.is_empty() {
            return source.to_string();
        }
        let mut text = String::with_capacity(self.preamble.len() + source.len() + 1);
        text.push_str(&self.preamble);
        if !self.preamble.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(source);
        text
    }

    /// Write the composed program to a fresh file
    pub async fn prepare(&self, source: &str, session_id: &str) -> Result<Artifact> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(self.file_name(session_id));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        let artifact = Artifact { path };

        file.write_all(self.compose(source).as_bytes()).await?;
        file.flush().await?;

        debug!("Prepared artifact {} for session {}", artifact.path.display(), session_id);
        Ok(artifact)
    }

    fn file_name(&self, session_id: &str) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}_{}_{}.{}",
            sanitize_session(session_id),
            Utc::now().timestamp_micros(),
            seq,
            self.extension
        )
    }
}

/// Reduce a session id to a filesystem-safe fragment
fn sanitize_session(session_id: &str) -> String {
    let fragment: String = session_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(MAX_SESSION_FRAGMENT)
        .collect();
    if fragment.is_empty() {
        "session".to_string()
    } else {
        fragment
    }
}

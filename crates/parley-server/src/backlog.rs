//! Crash-recoverable message backlog.
//!
//! An append-only file, one JSON array of messages per line, mirrored by an
//! in-memory list in arrival order. Appends are flushed and synced before
//! returning, so an acknowledged batch survives a process crash. Nothing is
//! ever mutated or deleted once written.

use std::path::Path;
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use parley_shared::protocol::ChatMessage;

use crate::error::ServerError;

struct BacklogInner {
    file: File,
    messages: Vec<ChatMessage>,
}

/// Cheaply clonable handle to the shared backlog.
#[derive(Clone)]
pub struct Backlog {
    inner: Arc<Mutex<BacklogInner>>,
}

impl Backlog {
    /// Open the backlog at `path`, replaying any persisted records in file
    /// order. A missing file is an empty backlog; an unreadable line is
    /// logged and skipped rather than aborting startup.
    pub async fn open(path: &Path) -> Result<Self, ServerError> {
        let mut messages = Vec::new();

        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                for (lineno, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Vec<ChatMessage>>(line) {
                        Ok(batch) => messages.extend(batch),
                        Err(e) => warn!(
                            line = lineno + 1,
                            error = %e,
                            "Skipping unreadable backlog line"
                        ),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        info!(
            path = %path.display(),
            restored = messages.len(),
            "Backlog opened"
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(BacklogInner { file, messages })),
        })
    }

    /// Append a batch as one line and make it durable before returning.
    pub async fn append(&self, batch: &[ChatMessage]) -> Result<(), ServerError> {
        let mut line = serde_json::to_vec(batch)?;
        line.push(b'\n');

        let mut inner = self.inner.lock().await;
        inner
            .file
            .write_all(&line)
            .await
            .map_err(ServerError::BacklogWrite)?;
        inner.file.flush().await.map_err(ServerError::BacklogWrite)?;
        inner
            .file
            .sync_data()
            .await
            .map_err(ServerError::BacklogWrite)?;

        inner.messages.extend_from_slice(batch);
        Ok(())
    }

    /// Messages a newly authenticated `name` should be shown: every
    /// broadcast, plus direct messages addressed to them, in arrival order.
    pub async fn visible_to(&self, name: &str) -> Vec<ChatMessage> {
        let inner = self.inner.lock().await;
        inner
            .messages
            .iter()
            .filter(|m| m.is_broadcast() || m.recipient == name)
            .cloned()
            .collect()
    }

    /// All broadcast messages, in arrival order. Used for the startup
    /// console summary.
    pub async fn broadcasts(&self) -> Vec<ChatMessage> {
        let inner = self.inner.lock().await;
        inner
            .messages
            .iter()
            .filter(|m| m.is_broadcast())
            .cloned()
            .collect()
    }
}

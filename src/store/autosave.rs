//! Debounced auto-save: rapid edits collapse into a single persisted write
//! after a quiet period. The only coalescing policy in the pipeline.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::StoreError;

/// Where debounced content ends up. The store-backed implementation writes
/// through [`PostStore::update_content`](super::PostStore::update_content);
/// tests substitute an in-memory sink.
#[async_trait]
pub trait ContentSink: Send + Sync + 'static {
    async fn persist(&self, content: &str) -> Result<(), StoreError>;
}

/// Binds a store and post id into a [`ContentSink`].
pub struct PostSaver {
    store: Arc<super::PostStore>,
    post_id: String,
}

impl PostSaver {
    pub fn new(store: Arc<super::PostStore>, post_id: impl Into<String>) -> Self {
        Self {
            store,
            post_id: post_id.into(),
        }
    }
}

#[async_trait]
impl ContentSink for PostSaver {
    async fn persist(&self, content: &str) -> Result<(), StoreError> {
        self.store.update_content(&self.post_id, content).await
    }
}

enum Command {
    Submit(String),
    Flush(oneshot::Sender<()>),
}

/// Coalesces content submissions: a write goes out only after `delay` of
/// quiet, always with the latest submitted content. A failed write is
/// logged, never surfaced; the in-memory content is the source of truth.
pub struct DebouncedSaver {
    tx: mpsc::UnboundedSender<Command>,
}

impl DebouncedSaver {
    pub fn new(sink: Arc<dyn ContentSink>, delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(sink, delay, rx));
        Self { tx }
    }

    /// Queue content for saving; restarts the quiet-period timer.
    pub fn submit(&self, content: impl Into<String>) {
        let _ = self.tx.send(Command::Submit(content.into()));
    }

    /// Force any pending content out now and wait for the write to finish.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run(sink: Arc<dyn ContentSink>, delay: Duration, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut pending: Option<String> = None;
    loop {
        let command = if pending.is_some() {
            match tokio::time::timeout(delay, rx.recv()).await {
                Ok(command) => command,
                Err(_) => {
                    // Quiet period elapsed: write out the latest content.
                    save(&sink, &mut pending).await;
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match command {
            Some(Command::Submit(content)) => pending = Some(content),
            Some(Command::Flush(done)) => {
                save(&sink, &mut pending).await;
                let _ = done.send(());
            }
            None => {
                // Saver dropped: flush whatever is left, then stop.
                save(&sink, &mut pending).await;
                return;
            }
        }
    }
}

async fn save(sink: &Arc<dyn ContentSink>, pending: &mut Option<String>) {
    if let Some(content) = pending.take() {
        debug!(chars = content.len(), "persisting coalesced content");
        if let Err(e) = sink.persist(&content).await {
            warn!(error = %e, "auto-save failed; editor content unaffected");
        }
    }
}

//! Per-job live preview fan-out
//!
//! A single overwritten slot holds the most recent annotated frame:
//! memory stays O(1) no matter how many viewers attach or how slow they
//! read. Viewers attaching mid-job see only frames produced after they
//! attached; the slot is not a queue and keeps no history.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::watch;

/// Latest annotated frame of a job
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    /// Encoded JPEG bytes
    pub jpeg: Bytes,

    /// Monotonic sequence number within the job
    pub seq: u64,
}

/// Publisher side of the preview slot
#[derive(Debug)]
pub struct PreviewMultiplexer {
    tx: watch::Sender<Option<PreviewFrame>>,
    seq: AtomicU64,
}

impl PreviewMultiplexer {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx,
            seq: AtomicU64::new(0),
        }
    }

    /// Overwrite the slot with a new frame
    pub fn publish(&self, jpeg: Bytes) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.tx.send_replace(Some(PreviewFrame { jpeg, seq }));
    }

    /// Publish the close sentinel; viewers terminate after observing it
    pub fn close(&self) {
        self.tx.send_replace(None);
    }

    /// Attach a viewer; it strictly waits for the next new frame (the
    /// current slot content is considered already seen)
    pub fn subscribe(&self) -> PreviewViewer {
        PreviewViewer {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of currently attached viewers
    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for PreviewMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Live handle of one preview consumer; dropping it detaches without
/// affecting other viewers or the job
pub struct PreviewViewer {
    rx: watch::Receiver<Option<PreviewFrame>>,
}

impl PreviewViewer {
    /// Wait for the next frame; `None` means the preview was closed
    pub async fn next(&mut self) -> Option<PreviewFrame> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}

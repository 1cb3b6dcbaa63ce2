//! Capture streams — one task per camera, feeding decoded frames to the
//! shared receiver.
//!
//! Streams never coordinate with each other. Each owns the receiving end of
//! an mpsc channel that its capture device (or a test) fills with
//! `ScanEvent`s, and hands every decoded text to `Receiver::ingest`.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::receiver::{IngestOutcome, Receiver};

/// Frames buffered per stream before the device side starts dropping.
pub const CAPTURE_QUEUE_DEPTH: usize = 100;

/// One frame's result from a capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A symbol was found and its text decoded.
    Decoded(String),
    /// No symbol in this frame.
    Nothing,
    /// The device failed; the stream ends.
    Fault(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture device fault on {stream}: {message}")]
    Device { stream: String, message: String },
}

/// Per-stream tallies, returned when the stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames: u64,
    pub empty: u64,
    pub stored: u64,
    pub duplicates: u64,
    pub rejected: u64,
}

pub struct CaptureStream {
    id: String,
    receiver: Receiver,
    events: mpsc::Receiver<ScanEvent>,
    stats: CaptureStats,
}

impl CaptureStream {
    pub fn new(id: impl Into<String>, receiver: Receiver, events: mpsc::Receiver<ScanEvent>) -> Self {
        Self {
            id: id.into(),
            receiver,
            events,
            stats: CaptureStats::default(),
        }
    }

    /// Drain events until the channel closes or the device faults.
    pub async fn run(mut self) -> Result<CaptureStats, CaptureError> {
        tracing::debug!(stream = %self.id, "capture stream started");

        while let Some(event) = self.events.recv().await {
            match event {
                ScanEvent::Nothing => {
                    self.stats.empty += 1;
                }
                ScanEvent::Fault(message) => {
                    tracing::warn!(stream = %self.id, error = %message, "capture device fault");
                    return Err(CaptureError::Device {
                        stream: self.id,
                        message,
                    });
                }
                ScanEvent::Decoded(text) => {
                    self.stats.frames += 1;
                    match self.receiver.ingest(&self.id, &text) {
                        IngestOutcome::Inserted | IngestOutcome::Completed => self.stats.stored += 1,
                        IngestOutcome::Duplicate | IngestOutcome::RepeatFrame => {
                            self.stats.duplicates += 1
                        }
                        IngestOutcome::Conflict
                        | IngestOutcome::Malformed(_)
                        | IngestOutcome::Foreign
                        | IngestOutcome::OutOfRange
                        | IngestOutcome::Stale => self.stats.rejected += 1,
                    }
                }
            }
        }

        tracing::info!(
            stream = %self.id,
            frames = self.stats.frames,
            stored = self.stats.stored,
            duplicates = self.stats.duplicates,
            rejected = self.stats.rejected,
            "capture stream closed"
        );
        Ok(self.stats)
    }
}

/// Start a capture stream task. Send `ScanEvent`s on the returned sender;
/// dropping it ends the stream.
pub fn spawn_capture(
    id: impl Into<String>,
    receiver: Receiver,
) -> (
    mpsc::Sender<ScanEvent>,
    JoinHandle<Result<CaptureStats, CaptureError>>,
) {
    let (tx, rx) = mpsc::channel(CAPTURE_QUEUE_DEPTH);
    let handle = tokio::spawn(CaptureStream::new(id, receiver, rx).run());
    (tx, handle)
}

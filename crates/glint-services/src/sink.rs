//! Render sinks — where the scheduler puts each encoded record.
//!
//! A real deployment draws records as visual codes on one or more display
//! surfaces. The sinks here cover the text and in-process cases: a line
//! writer for piping into an external renderer, an in-memory recorder, and
//! a loopback that feeds capture streams directly.

use std::io::Write;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;

use crate::capture::ScanEvent;

/// Render collaborator. `render` is called once per emission from the
/// scheduler's tick and must not block for long.
pub trait SymbolSink: Send + Sync {
    fn render(&self, surface: usize, record: &str) -> Result<(), SinkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("render failed: {0}")]
    Render(String),

    #[error("sink io error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Line sink ─────────────────────────────────────────────────────────────────

/// Writes `surface<TAB>record` lines to any writer.
pub struct LineSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl LineSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> SymbolSink for LineSink<W> {
    fn render(&self, surface: usize, record: &str) -> Result<(), SinkError> {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(out, "{surface}\t{record}")?;
        out.flush()?;
        Ok(())
    }
}

// ── Memory sink ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub surface: usize,
    pub record: String,
    pub at: Instant,
}

/// Records every emission. Optionally fails once a set number of renders
/// have succeeded, to exercise the fault path.
#[derive(Default)]
pub struct MemorySink {
    emissions: Mutex<Vec<Emission>>,
    fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(renders: usize) -> Self {
        Self {
            emissions: Mutex::new(Vec::new()),
            fail_after: Some(renders),
        }
    }

    pub fn emissions(&self) -> Vec<Emission> {
        self.emissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn records(&self) -> Vec<String> {
        self.emissions().into_iter().map(|e| e.record).collect()
    }

    pub fn len(&self) -> usize {
        self.emissions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SymbolSink for MemorySink {
    fn render(&self, surface: usize, record: &str) -> Result<(), SinkError> {
        let mut emissions = self.emissions.lock().unwrap_or_else(|e| e.into_inner());
        if self.fail_after.is_some_and(|limit| emissions.len() >= limit) {
            return Err(SinkError::Render("display unavailable".into()));
        }
        emissions.push(Emission {
            surface,
            record: record.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }
}

// ── Loopback sink ─────────────────────────────────────────────────────────────

/// Hands each record straight to a capture stream as a decoded frame.
///
/// Surface `s` feeds `streams[s % streams.len()]`. A full channel drops the
/// frame, the way a camera misses a symbol it was too slow to catch.
pub struct LoopbackSink {
    streams: Vec<mpsc::Sender<ScanEvent>>,
}

impl LoopbackSink {
    pub fn new(streams: Vec<mpsc::Sender<ScanEvent>>) -> Self {
        Self { streams }
    }
}

impl SymbolSink for LoopbackSink {
    fn render(&self, surface: usize, record: &str) -> Result<(), SinkError> {
        if self.streams.is_empty() {
            return Err(SinkError::Render("no capture streams attached".into()));
        }
        let stream = &self.streams[surface % self.streams.len()];
        match stream.try_send(ScanEvent::Decoded(record.to_string())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::trace!(surface, "capture stream busy, frame missed");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => {
                Err(SinkError::Render(format!("capture stream for surface {surface} closed")))
            }
        }
    }
}

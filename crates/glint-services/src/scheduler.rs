//! Sender scheduler — paces encoded records onto the render sink.
//!
//! State machine:
//!
//!   Idle ──start──▶ Sending ──pause──▶ Paused
//!     ▲                │  ◀──resume───   │
//!     └──── reset ─────┴──── reset ──────┘
//!
//! A single run task ticks once per cadence while `Sending`. Operator
//! controls take the control lock between ticks and wake the task, so a
//! change is observed by the next tick and never interrupts one in flight.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use glint_core::config::{SendMode, SenderConfig};
use glint_core::recovery::ResendRequest;
use glint_core::wire::{Symbol, WireError, WireFormat};
use serde::Serialize;
use tokio::sync::{broadcast, watch, Notify};
use tokio::time::Instant;

use crate::sink::{SinkError, SymbolSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendState {
    Idle,
    Sending,
    Paused,
}

/// Observable sender progress, republished after every emission and
/// control change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendProgress {
    pub state: SendState,
    pub sent: u64,
    pub last_index: Option<u32>,
    pub cursor: usize,
    pub list_len: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("send list is empty")]
    EmptySendList,

    #[error("cadence must be non-zero")]
    InvalidCadence,

    #[error("render sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("failed to encode symbol: {0}")]
    Encode(#[from] WireError),
}

struct Control {
    state: SendState,
    send_list: Vec<u32>,
    cursor: usize,
    cadence: Duration,
    sent: u64,
    last_index: Option<u32>,
}

impl Control {
    fn progress(&self) -> SendProgress {
        SendProgress {
            state: self.state,
            sent: self.sent,
            last_index: self.last_index,
            cursor: self.cursor,
            list_len: self.send_list.len(),
        }
    }
}

struct Inner {
    records: Vec<String>,
    mode: SendMode,
    surfaces: usize,
    control: Mutex<Control>,
    wake: Notify,
    progress: watch::Sender<SendProgress>,
}

/// Cloneable handle: one clone drives `run`, the others issue controls.
#[derive(Clone)]
pub struct SenderScheduler {
    inner: Arc<Inner>,
}

impl SenderScheduler {
    /// Pre-encode `symbols` and build an idle scheduler.
    pub fn new(
        symbols: &[Symbol],
        format: WireFormat,
        config: &SenderConfig,
    ) -> Result<Self, SchedulerError> {
        let records = symbols
            .iter()
            .map(|symbol| symbol.encode(format))
            .collect::<Result<Vec<_>, _>>()?;
        let cadence = cadence_for_fps(config.fps)?;

        let control = Control {
            state: SendState::Idle,
            send_list: Vec::new(),
            cursor: 0,
            cadence,
            sent: 0,
            last_index: None,
        };
        let (progress, _) = watch::channel(control.progress());

        Ok(Self {
            inner: Arc::new(Inner {
                records,
                mode: config.mode,
                surfaces: config.surfaces.max(1),
                control: Mutex::new(control),
                wake: Notify::new(),
                progress,
            }),
        })
    }

    pub fn symbol_count(&self) -> usize {
        self.inner.records.len()
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.inner
            .control
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, control: &Control) {
        self.inner.progress.send_replace(control.progress());
    }

    // ── Operator controls ─────────────────────────────────────────────────────

    /// Begin sending `send_list`, or every symbol when `None`.
    ///
    /// Indices past the symbol count are dropped with a warning.
    pub fn start(&self, send_list: Option<Vec<u32>>) -> Result<(), SchedulerError> {
        let count = self.symbol_count() as u32;
        let list: Vec<u32> = match send_list {
            None => (0..count).collect(),
            Some(list) => list
                .into_iter()
                .filter(|&index| {
                    let keep = index < count;
                    if !keep {
                        tracing::warn!(index, count, "ignoring out-of-range index in send list");
                    }
                    keep
                })
                .collect(),
        };
        if list.is_empty() {
            return Err(SchedulerError::EmptySendList);
        }

        {
            let mut control = self.control();
            control.send_list = list;
            control.cursor = 0;
            control.state = SendState::Sending;
            self.publish(&control);
            tracing::info!(symbols = control.send_list.len(), mode = ?self.inner.mode, "sending started");
        }
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Restart on just the indices an operator asked for.
    pub fn resend(&self, request: &ResendRequest) -> Result<(), SchedulerError> {
        tracing::info!(indices = %request.to_list_string(), "resending");
        self.start(Some(request.indices.clone()))
    }

    pub fn pause(&self) {
        let mut control = self.control();
        if control.state == SendState::Sending {
            control.state = SendState::Paused;
            self.publish(&control);
            tracing::info!(cursor = control.cursor, "sending paused");
        }
        drop(control);
        self.inner.wake.notify_one();
    }

    pub fn resume(&self) {
        let mut control = self.control();
        if control.state == SendState::Paused {
            control.state = SendState::Sending;
            self.publish(&control);
            tracing::info!(cursor = control.cursor, "sending resumed");
        }
        drop(control);
        self.inner.wake.notify_one();
    }

    /// Time between emissions, from the next tick onwards.
    pub fn set_cadence(&self, period: Duration) -> Result<(), SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::InvalidCadence);
        }
        self.control().cadence = period;
        tracing::info!(period_ms = period.as_millis() as u64, "cadence changed");
        self.inner.wake.notify_one();
        Ok(())
    }

    pub fn set_fps(&self, fps: u32) -> Result<(), SchedulerError> {
        self.set_cadence(cadence_for_fps(fps)?)
    }

    /// Back to `Idle` with an empty send list and zeroed counters.
    pub fn reset(&self) {
        {
            let mut control = self.control();
            control.state = SendState::Idle;
            control.send_list.clear();
            control.cursor = 0;
            control.sent = 0;
            control.last_index = None;
            self.publish(&control);
        }
        tracing::info!("sender reset");
        self.inner.wake.notify_one();
    }

    pub fn cadence(&self) -> Duration {
        self.control().cadence
    }

    pub fn state(&self) -> SendState {
        self.control().state
    }

    pub fn progress(&self) -> SendProgress {
        self.inner.progress.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SendProgress> {
        self.inner.progress.subscribe()
    }

    // ── Emission ──────────────────────────────────────────────────────────────

    /// Emit one symbol if sending. Returns the emitted index.
    ///
    /// A sink failure pauses the scheduler and is returned to the caller.
    pub fn tick(&self, sink: &dyn SymbolSink) -> Result<Option<u32>, SchedulerError> {
        let mut control = self.control();
        if control.state != SendState::Sending {
            return Ok(None);
        }
        if control.cursor >= control.send_list.len() {
            control.state = SendState::Idle;
            self.publish(&control);
            return Ok(None);
        }

        let index = control.send_list[control.cursor];
        let surface = index as usize % self.inner.surfaces;
        if let Err(e) = sink.render(surface, &self.inner.records[index as usize]) {
            control.state = SendState::Paused;
            self.publish(&control);
            tracing::warn!(index, surface, error = %e, "render failed, sending paused");
            return Err(e.into());
        }

        control.sent += 1;
        control.last_index = Some(index);
        control.cursor += 1;
        if control.cursor == control.send_list.len() {
            match self.inner.mode {
                SendMode::Looping => control.cursor = 0,
                SendMode::SingleShot => {
                    control.state = SendState::Idle;
                    tracing::info!(sent = control.sent, "send list finished");
                }
            }
        }
        self.publish(&control);
        tracing::trace!(index, surface, "symbol emitted");
        Ok(Some(index))
    }

    /// Tick at the configured cadence until shutdown or a sink failure.
    pub async fn run(
        self,
        sink: Arc<dyn SymbolSink>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), SchedulerError> {
        let mut last_tick: Option<Instant> = None;

        loop {
            let (state, cadence) = {
                let control = self.control();
                (control.state, control.cadence)
            };

            if state != SendState::Sending {
                last_tick = None;
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!("sender shutting down");
                        return Ok(());
                    }
                    _ = self.inner.wake.notified() => continue,
                }
            }

            let due = last_tick.map(|t| t + cadence).unwrap_or_else(Instant::now);
            let now = Instant::now();
            if now >= due {
                self.tick(sink.as_ref())?;
                // Fell more than a period behind: resync instead of bursting.
                last_tick = Some(if now.duration_since(due) > cadence { now } else { due });
                continue;
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("sender shutting down");
                    return Ok(());
                }
                _ = self.inner.wake.notified() => {}
                _ = tokio::time::sleep_until(due) => {}
            }
        }
    }
}

fn cadence_for_fps(fps: u32) -> Result<Duration, SchedulerError> {
    if fps == 0 {
        return Err(SchedulerError::InvalidCadence);
    }
    // Rates past one per nanosecond truncate to a zero period.
    let cadence = Duration::from_secs(1) / fps;
    if cadence.is_zero() {
        return Err(SchedulerError::InvalidCadence);
    }
    Ok(cadence)
}

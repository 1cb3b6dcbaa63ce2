//! Receiver — session state, completion monitoring, and the handle that
//! capture streams feed.
//!
//! The first valid symbol fixes the session (file tag, format, total). Every
//! later symbol is checked against it and offered to the shared chunk store.
//! When the store holds enough distinct indices the session reassembles
//! exactly once and publishes the result.
//!
//! A reset swaps in a fresh `ReceiverSession`. Anything still holding the
//! old one (a capture task mid-frame, a stale generation number) gets
//! `IngestOutcome::Stale` and changes nothing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use dashmap::DashMap;
use glint_core::config::{CompletionMode, ReceiverConfig};
use glint_core::wire::{suggested_file_name, Symbol, WireError, WireFormat};
use serde::Serialize;
use tokio::sync::watch;

use crate::chunk_store::{ChunkStore, InsertOutcome};
use crate::delivery::DeliveryTracker;
use crate::reassembler::{Assembled, GapPolicy};

// ── Policy ────────────────────────────────────────────────────────────────────

/// How many distinct indices complete a transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompletionPolicy {
    /// All `total` indices.
    Strict,
    /// `ceil(total * ratio)` indices, at least one.
    Tolerant { ratio: f64 },
}

impl CompletionPolicy {
    pub fn required(&self, total: u32) -> u32 {
        match *self {
            CompletionPolicy::Strict => total,
            CompletionPolicy::Tolerant { ratio } => {
                // The epsilon keeps products like 15 * 0.8 from rounding up to 13.
                let needed = (total as f64 * ratio - 1e-9).ceil() as u32;
                needed.clamp(1, total.max(1))
            }
        }
    }

    pub fn gap_policy(&self) -> GapPolicy {
        match self {
            CompletionPolicy::Strict => GapPolicy::Warn,
            CompletionPolicy::Tolerant { .. } => GapPolicy::Skip,
        }
    }
}

impl From<&ReceiverConfig> for CompletionPolicy {
    fn from(config: &ReceiverConfig) -> Self {
        match config.completion {
            CompletionMode::Strict => CompletionPolicy::Strict,
            CompletionMode::Tolerant => CompletionPolicy::Tolerant {
                ratio: config.tolerant_ratio,
            },
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Facts fixed by the first valid symbol of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub file_tag: String,
    pub format: WireFormat,
    pub total: u32,
    pub required: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Uninitialized,
    Active(SessionInfo),
}

/// What happened to one captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New index stored.
    Inserted,
    /// New index stored, and it completed the transfer.
    Completed,
    /// Index already stored with the same bytes.
    Duplicate,
    /// Identical text already seen this session; not parsed again.
    RepeatFrame,
    /// Index already stored with different bytes; first value kept.
    Conflict,
    /// Record failed to decode.
    Malformed(WireError),
    /// Record belongs to a different transfer than the active session.
    Foreign,
    /// Index outside the session's total.
    OutOfRange,
    /// Session was reset after this frame was routed to it.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReceiveProgress {
    pub received: u32,
    pub total: u32,
    pub required: u32,
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Receiving,
    Complete,
    Reset,
}

/// One transfer's worth of receiver state.
pub struct ReceiverSession {
    generation: u64,
    policy: CompletionPolicy,
    info: OnceLock<SessionInfo>,
    store: ChunkStore,
    // decoded text -> index, for frames already accepted this session
    seen_frames: DashMap<String, u32>,
    deliveries: DeliveryTracker,
    completed: AtomicBool,
    output: OnceLock<Assembled>,
    phase: watch::Sender<Phase>,
}

impl ReceiverSession {
    fn new(generation: u64, policy: CompletionPolicy) -> Self {
        let (phase, _) = watch::channel(Phase::Receiving);
        Self {
            generation,
            policy,
            info: OnceLock::new(),
            store: ChunkStore::new(),
            seen_frames: DashMap::new(),
            deliveries: DeliveryTracker::new(),
            completed: AtomicBool::new(false),
            output: OnceLock::new(),
            phase,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Handle one decoded frame from capture stream `stream`.
    pub fn ingest(&self, stream: &str, text: &str) -> IngestOutcome {
        if *self.phase.borrow() == Phase::Reset {
            return IngestOutcome::Stale;
        }

        if let Some(index) = self.seen_frames.get(text).map(|entry| *entry.value()) {
            self.deliveries.record(index, stream);
            tracing::trace!(stream, index, "repeat frame dropped");
            return IngestOutcome::RepeatFrame;
        }

        let (symbol, format) = match Symbol::decode(text) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(stream, error = %e, "dropping malformed record");
                return IngestOutcome::Malformed(e);
            }
        };

        let info = self.info.get_or_init(|| {
            let required = self.policy.required(symbol.total);
            tracing::info!(
                generation = self.generation,
                file_tag = %symbol.file_tag,
                ?format,
                total = symbol.total,
                required,
                "session established"
            );
            SessionInfo {
                file_tag: symbol.file_tag.clone(),
                format,
                total: symbol.total,
                required,
            }
        });

        if symbol.file_tag != info.file_tag {
            tracing::debug!(
                stream,
                tag = %symbol.file_tag,
                session_tag = %info.file_tag,
                "dropping symbol from another transfer"
            );
            return IngestOutcome::Foreign;
        }
        if symbol.total != info.total {
            tracing::debug!(
                stream,
                declared = symbol.total,
                session_total = info.total,
                "total differs from session, keeping session total"
            );
        }
        if symbol.index >= info.total {
            tracing::debug!(stream, index = symbol.index, total = info.total, "index out of range");
            return IngestOutcome::OutOfRange;
        }

        self.deliveries.record(symbol.index, stream);
        self.seen_frames.insert(text.to_string(), symbol.index);

        match self.store.insert(symbol.index, symbol.payload) {
            InsertOutcome::Duplicate => {
                tracing::debug!(stream, index = symbol.index, "duplicate symbol");
                IngestOutcome::Duplicate
            }
            InsertOutcome::Conflict => {
                tracing::warn!(
                    stream,
                    index = symbol.index,
                    "conflicting payload for stored index, keeping first"
                );
                IngestOutcome::Conflict
            }
            InsertOutcome::Inserted => {
                tracing::trace!(stream, index = symbol.index, received = self.store.len(), "symbol stored");
                if self.check_completion(info) {
                    IngestOutcome::Completed
                } else {
                    IngestOutcome::Inserted
                }
            }
        }
    }

    /// Reassemble if the threshold is met and nobody has yet. Returns true
    /// only for the call that did the reassembly.
    fn check_completion(&self, info: &SessionInfo) -> bool {
        if (self.store.len() as u64) < info.required as u64 {
            return false;
        }
        if self
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let file_name = suggested_file_name(&info.file_tag, info.format);
        let assembled =
            Assembled::from_store(file_name, &self.store, info.total, self.policy.gap_policy());
        tracing::info!(
            generation = self.generation,
            file_name = %assembled.file_name,
            bytes = assembled.data.len(),
            received = self.store.len(),
            total = info.total,
            missing = assembled.missing.len(),
            "transfer complete"
        );
        let _ = self.output.set(assembled);
        self.phase.send_if_modified(|phase| {
            if *phase == Phase::Receiving {
                *phase = Phase::Complete;
                true
            } else {
                false
            }
        });
        self.deliveries.log_stats();
        true
    }

    pub fn session(&self) -> Session {
        match self.info.get() {
            Some(info) => Session::Active(info.clone()),
            None => Session::Uninitialized,
        }
    }

    pub fn progress(&self) -> ReceiveProgress {
        let (total, required) = self
            .info
            .get()
            .map(|info| (info.total, info.required))
            .unwrap_or((0, 0));
        ReceiveProgress {
            received: self.store.len() as u32,
            total,
            required,
            complete: self.completed.load(Ordering::Acquire),
        }
    }

    /// Ascending indices not yet received. Empty before the session is
    /// established.
    pub fn missing(&self) -> Vec<u32> {
        match self.info.get() {
            Some(info) => self.store.missing(info.total),
            None => Vec::new(),
        }
    }

    pub fn output(&self) -> Option<&Assembled> {
        self.output.get()
    }

    pub fn deliveries(&self) -> &DeliveryTracker {
        &self.deliveries
    }

    /// Wait until this session completes. `None` if it is reset first.
    pub async fn wait_complete(&self) -> Option<Assembled> {
        let mut phase = self.phase.subscribe();
        let reached = phase.wait_for(|p| *p != Phase::Receiving).await.ok()?;
        match *reached {
            Phase::Complete => self.output.get().cloned(),
            _ => None,
        }
    }

    fn close(&self) {
        self.phase.send_replace(Phase::Reset);
    }
}

// ── Receiver handle ───────────────────────────────────────────────────────────

struct ReceiverInner {
    policy: CompletionPolicy,
    generation: AtomicU64,
    current: RwLock<Arc<ReceiverSession>>,
}

/// Cloneable handle shared by every capture stream.
#[derive(Clone)]
pub struct Receiver {
    inner: Arc<ReceiverInner>,
}

impl Receiver {
    pub fn new(policy: CompletionPolicy) -> Self {
        Self {
            inner: Arc::new(ReceiverInner {
                policy,
                generation: AtomicU64::new(0),
                current: RwLock::new(Arc::new(ReceiverSession::new(0, policy))),
            }),
        }
    }

    pub fn from_config(config: &ReceiverConfig) -> Self {
        Self::new(CompletionPolicy::from(config))
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.inner.policy
    }

    /// The live session. Holders of an old session see `Stale` after a reset.
    pub fn current(&self) -> Arc<ReceiverSession> {
        self.inner
            .current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub fn ingest(&self, stream: &str, text: &str) -> IngestOutcome {
        self.current().ingest(stream, text)
    }

    /// Ingest on behalf of a caller that captured `generation` earlier.
    pub fn ingest_tagged(&self, generation: u64, stream: &str, text: &str) -> IngestOutcome {
        let session = self.current();
        if session.generation() != generation {
            tracing::debug!(stream, generation, current = session.generation(), "stale frame");
            return IngestOutcome::Stale;
        }
        session.ingest(stream, text)
    }

    /// Discard the current session and start a fresh one. Returns the new
    /// generation.
    pub fn reset(&self) -> u64 {
        let mut current = self.inner.current.write().unwrap_or_else(|e| e.into_inner());
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let old = std::mem::replace(
            &mut *current,
            Arc::new(ReceiverSession::new(generation, self.inner.policy)),
        );
        old.close();
        tracing::info!(generation, "receiver reset");
        generation
    }

    pub fn session(&self) -> Session {
        self.current().session()
    }

    pub fn progress(&self) -> ReceiveProgress {
        self.current().progress()
    }

    pub fn missing(&self) -> Vec<u32> {
        self.current().missing()
    }

    pub fn output(&self) -> Option<Assembled> {
        self.current().output().cloned()
    }

    /// Wait for the session live at call time to complete.
    pub async fn wait_complete(&self) -> Option<Assembled> {
        self.current().wait_complete().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

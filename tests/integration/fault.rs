use crate::*;
use std::collections::HashSet;
use std::sync::Mutex;

use glint_services::SinkError;

// ── Lossy channel helpers ─────────────────────────────────────────────────────

/// Wraps a sink and loses chosen symbols, the way a camera misses frames.
///
/// Each listed index is lost the first time it is rendered only, so a later
/// resend of the same index gets through.
pub struct LossySink {
    inner: Arc<dyn SymbolSink>,
    lose_once: Mutex<HashSet<u32>>,
}

impl LossySink {
    pub fn new(inner: Arc<dyn SymbolSink>, lose: impl IntoIterator<Item = u32>) -> Self {
        Self {
            inner,
            lose_once: Mutex::new(lose.into_iter().collect()),
        }
    }

    /// Indices still waiting to be lost.
    pub fn pending_losses(&self) -> usize {
        self.lose_once.lock().unwrap().len()
    }
}

impl SymbolSink for LossySink {
    fn render(&self, surface: usize, record: &str) -> Result<(), SinkError> {
        let (symbol, _) =
            Symbol::decode(record).map_err(|e| SinkError::Render(e.to_string()))?;
        if self.lose_once.lock().unwrap().remove(&symbol.index) {
            return Ok(());
        }
        self.inner.render(surface, record)
    }
}

/// Renders every record on every inner sink: several cameras watching the
/// same display.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn SymbolSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn SymbolSink>>) -> Self {
        Self { sinks }
    }
}

impl SymbolSink for FanoutSink {
    fn render(&self, surface: usize, record: &str) -> Result<(), SinkError> {
        for sink in &self.sinks {
            sink.render(surface, record)?;
        }
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
//  Channel faults
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_lossy_sink_loses_each_index_once() {
    let data = test_bytes(300);
    let symbols = encode_file(&data, "a.bin", EncodingPolicy::Direct, WireFormat::Compact);
    let lines = records(&symbols, WireFormat::Compact);

    let memory = Arc::new(glint_services::MemorySink::new());
    let lossy = LossySink::new(memory.clone(), [1]);
    for line in &lines {
        lossy.render(0, line).unwrap();
    }
    assert_eq!(memory.len(), 2);
    assert_eq!(lossy.pending_losses(), 0);

    lossy.render(0, &lines[1]).unwrap();
    assert_eq!(memory.records()[2], lines[1]);
}

/// Corrupted frames are dropped without disturbing the transfer.
#[test]
fn test_corrupted_frames_are_absorbed() {
    let data = test_bytes(450);
    let symbols = encode_file(&data, "scan.pdf", EncodingPolicy::Direct, WireFormat::Legacy);
    let lines = records(&symbols, WireFormat::Legacy);
    let receiver = Receiver::new(CompletionPolicy::Strict);

    for (i, line) in lines.iter().enumerate() {
        // A partial read of the same symbol just before the good one.
        let truncated = &line[..line.len() / 2];
        assert!(matches!(
            receiver.ingest("cam0", truncated),
            IngestOutcome::Malformed(_)
        ));
        let outcome = receiver.ingest("cam0", line);
        if i + 1 == lines.len() {
            assert_eq!(outcome, IngestOutcome::Completed);
        } else {
            assert_eq!(outcome, IngestOutcome::Inserted);
        }
    }

    let out = receiver.output().unwrap();
    assert_eq!(out.file_name, "scan.pdf");
    assert_eq!(&out.data[..], &data[..]);
}

/// A sink failure stops the sender and leaves it paused at the failed
/// symbol; resuming after the fault clears carries on from there.
#[tokio::test(start_paused = true)]
async fn test_render_fault_pauses_sender() -> Result<()> {
    let data = test_bytes(500);
    let scheduler = scheduler_for(
        &data,
        "a.bin",
        WireFormat::Compact,
        &sender_config(20, SendMode::SingleShot, 1),
    )?;
    let failing = Arc::new(glint_services::MemorySink::failing_after(3));
    let (_shutdown, handle) = spawn_sender(&scheduler, failing.clone());

    scheduler.start(None)?;
    let result = handle.await?;
    assert!(matches!(result, Err(SchedulerError::Sink(_))));
    assert_eq!(failing.len(), 3);
    assert_eq!(scheduler.progress().cursor, 3);

    // Fresh display: the remaining symbols go out from the retained cursor.
    let display = Arc::new(glint_services::MemorySink::new());
    let (shutdown, handle) = spawn_sender(&scheduler, display.clone());
    scheduler.resume();
    let mut progress = scheduler.subscribe();
    progress
        .wait_for(|p| p.state == glint_services::SendState::Idle)
        .await?;
    assert_eq!(display.len(), 2);

    shutdown.send(())?;
    handle.await??;
    Ok(())
}

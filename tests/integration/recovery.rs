use crate::fault::LossySink;
use crate::*;

use glint_core::recovery::ResendRequest;
use glint_services::{spawn_capture, write_artifact, LoopbackSink, ReceiveProgress, SendState};

// ══════════════════════════════════════════════════════════════════════════════
//  Operator-driven recovery
// ══════════════════════════════════════════════════════════════════════════════

/// First pass loses symbols 1 and 3. The receiver reports them missing, the
/// operator types that list into the sender, and the resend pass completes
/// the file.
#[tokio::test(start_paused = true)]
async fn test_resend_fills_gaps() -> Result<()> {
    let data = test_bytes(560);
    let scheduler = scheduler_for(
        &data,
        "report.pdf",
        WireFormat::Compact,
        &sender_config(20, SendMode::SingleShot, 1),
    )?;
    let receiver = Receiver::new(CompletionPolicy::Strict);
    let (camera, stream) = spawn_capture("cam0", receiver.clone());

    let sink = Arc::new(LossySink::new(Arc::new(LoopbackSink::new(vec![camera])), [1, 3]));
    let (shutdown, sender) = spawn_sender(&scheduler, sink);
    let mut progress = scheduler.subscribe();

    scheduler.start(None)?;
    progress
        .wait_for(|p| p.state == SendState::Idle && p.sent == 6)
        .await?;
    // Let the capture stream drain what was shown.
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    assert_eq!(receiver.missing(), vec![1, 3]);
    assert_eq!(
        receiver.progress(),
        ReceiveProgress {
            received: 4,
            total: 6,
            required: 6,
            complete: false,
        }
    );

    // What the receiver shows, the operator types back in.
    let shown = ResendRequest::new(receiver.missing())?.to_list_string();
    assert_eq!(shown, "1, 3");
    scheduler.resend(&ResendRequest::parse(&shown)?)?;

    let out = receiver.wait_complete().await.context("receiver was reset")?;
    assert_eq!(&out.data[..], &data[..]);
    assert!(out.missing.is_empty());

    let dir = temp_out_dir("resend");
    let path = write_artifact(&dir, &out)?;
    assert_eq!(path, dir.join("received_file.pdf"));
    assert_eq!(std::fs::read(&path)?, data);
    let _ = std::fs::remove_dir_all(&dir);

    shutdown.send(())?;
    sender.await??;
    let stats = stream.await??;
    assert_eq!(stats.stored, 6);
    Ok(())
}

/// Tolerant completion: 8 of 10 is enough. The output lists its holes
/// and is the concatenation of what arrived.
#[test]
fn test_tolerant_completion_reports_gaps() {
    let data = test_bytes(1_000);
    let symbols = encode_file(&data, "clip.mp4", EncodingPolicy::Direct, WireFormat::Compact);
    let lines = records(&symbols, WireFormat::Compact);
    let receiver = Receiver::new(CompletionPolicy::Tolerant { ratio: 0.8 });

    for i in [0, 1, 2, 4, 5, 6, 7] {
        assert_eq!(receiver.ingest("cam0", &lines[i]), IngestOutcome::Inserted);
    }
    assert_eq!(receiver.ingest("cam0", &lines[9]), IngestOutcome::Completed);

    let out = receiver.output().unwrap();
    assert_eq!(out.missing, vec![3, 8]);
    let mut expected = Vec::new();
    for i in [0, 1, 2, 4, 5, 6, 7, 9] {
        expected.extend_from_slice(&data[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE]);
    }
    assert_eq!(&out.data[..], &expected[..]);

    // Late arrivals are stored but the artifact is fixed.
    assert_eq!(receiver.ingest("cam0", &lines[3]), IngestOutcome::Inserted);
    assert_eq!(receiver.missing(), vec![8]);
    assert_eq!(receiver.output().unwrap(), out);
}

/// A reset mid-transfer abandons it; the next file starts clean even
/// though frames of the old one are still in flight.
#[test]
fn test_reset_between_transfers() {
    let first = test_bytes(300);
    let second: Vec<u8> = test_bytes(200).into_iter().rev().collect();
    let old = records(
        &encode_file(&first, "old.txt", EncodingPolicy::Direct, WireFormat::Legacy),
        WireFormat::Legacy,
    );
    let new = records(
        &encode_file(&second, "new.txt", EncodingPolicy::Direct, WireFormat::Legacy),
        WireFormat::Legacy,
    );

    let receiver = Receiver::new(CompletionPolicy::Strict);
    let stale_session = receiver.current();
    receiver.ingest("cam0", &old[0]);
    let generation = receiver.reset();

    assert_eq!(stale_session.ingest("cam0", &old[1]), IngestOutcome::Stale);
    assert_eq!(receiver.ingest_tagged(generation, "cam0", &new[1]), IngestOutcome::Inserted);
    // The old file's frames are now foreign to the new session.
    assert_eq!(receiver.ingest("cam0", &old[2]), IngestOutcome::Foreign);
    assert_eq!(receiver.ingest_tagged(generation, "cam0", &new[0]), IngestOutcome::Completed);

    let out = receiver.output().unwrap();
    assert_eq!(out.file_name, "new.txt");
    assert_eq!(&out.data[..], &second[..]);
}

/// Redundant policy is best-effort: symbols are XOR combinations the
/// receiver cannot invert, so it reassembles them positionally. The
/// transfer completes over the over-provisioned count.
#[test]
fn test_redundant_policy_is_positional() {
    let data = test_bytes(BLOCK_SIZE);
    let policy = EncodingPolicy::Redundant { overprovision: 3 };
    let symbols = encode_file(&data, "one.bin", policy, WireFormat::Compact);
    assert_eq!(symbols.len(), 3);

    let receiver = Receiver::new(CompletionPolicy::Strict);
    for line in records(&symbols, WireFormat::Compact) {
        receiver.ingest("cam0", &line);
    }

    let out = receiver.output().unwrap();
    assert_eq!(out.data.len(), 3 * BLOCK_SIZE);
    // A single block XORed with itself is either the block or zeros.
    for piece in out.data.chunks(BLOCK_SIZE) {
        assert!(piece == &data[..] || piece.iter().all(|&b| b == 0));
    }
}

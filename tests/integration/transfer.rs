use crate::fault::LossySink;
use crate::*;

use glint_services::{spawn_capture, write_artifact, LineSink, LoopbackSink, SendState};

// ══════════════════════════════════════════════════════════════════════════════
//  Sender to receiver over the loopback
// ══════════════════════════════════════════════════════════════════════════════

/// Single-shot sender, one camera, legacy records: the artifact is written
/// under the original file name.
#[tokio::test(start_paused = true)]
async fn test_single_shot_transfer_writes_file() -> Result<()> {
    let data = test_bytes(2_345);
    let scheduler = scheduler_for(
        &data,
        "firmware.img",
        WireFormat::Legacy,
        &sender_config(20, SendMode::SingleShot, 1),
    )?;
    let receiver = Receiver::new(CompletionPolicy::Strict);
    let (camera, stream) = spawn_capture("cam0", receiver.clone());

    let (shutdown, sender) = spawn_sender(&scheduler, Arc::new(LoopbackSink::new(vec![camera])));
    let started = tokio::time::Instant::now();
    scheduler.start(None)?;

    let out = receiver.wait_complete().await.context("receiver was reset")?;
    assert_eq!(&out.data[..], &data[..]);
    // 24 symbols at 20 fps: the last one goes out 23 periods after the first.
    assert_eq!(started.elapsed(), std::time::Duration::from_millis(23 * 50));

    let dir = temp_out_dir("single-shot");
    let path = write_artifact(&dir, &out)?;
    assert_eq!(path, dir.join("firmware.img"));
    assert_eq!(std::fs::read(&path)?, data);
    let _ = std::fs::remove_dir_all(&dir);

    shutdown.send(())?;
    sender.await??;
    assert_eq!(stream.await??.stored, 24);
    Ok(())
}

/// A looping sender covers for lost frames by itself: whatever the camera
/// missed on one lap it catches on the next.
#[tokio::test(start_paused = true)]
async fn test_looping_sender_recovers_lost_frames() -> Result<()> {
    let data = test_bytes(900);
    let scheduler = scheduler_for(
        &data,
        "song.ogg",
        WireFormat::Compact,
        &sender_config(25, SendMode::Looping, 1),
    )?;
    let receiver = Receiver::new(CompletionPolicy::Strict);
    let (camera, _stream) = spawn_capture("cam0", receiver.clone());

    let lossy = Arc::new(LossySink::new(
        Arc::new(LoopbackSink::new(vec![camera])),
        [0, 4, 8],
    ));
    let (shutdown, sender) = spawn_sender(&scheduler, lossy.clone());
    scheduler.start(None)?;

    let out = receiver.wait_complete().await.context("receiver was reset")?;
    assert_eq!(&out.data[..], &data[..]);
    assert_eq!(lossy.pending_losses(), 0);

    let progress = scheduler.progress();
    assert_eq!(progress.state, SendState::Sending);
    assert!(progress.sent > 9, "completion needed a second lap");

    shutdown.send(())?;
    sender.await??;
    Ok(())
}

/// The text the line sink prints is exactly what a receiver accepts once
/// the surface prefix is removed.
#[test]
fn test_line_sink_output_feeds_receiver() -> Result<()> {
    let data = test_bytes(420);
    let scheduler = scheduler_for(
        &data,
        "table.xlsx",
        WireFormat::Compact,
        &sender_config(20, SendMode::SingleShot, 2),
    )?;
    let sink = LineSink::new(Vec::new());
    scheduler.start(None)?;
    while scheduler.tick(&sink)?.is_some() {}

    let text = String::from_utf8(sink.into_inner())?;
    let receiver = Receiver::new(CompletionPolicy::Strict);
    for (n, line) in text.lines().enumerate() {
        let (surface, record) = line.split_once('\t').context("missing surface prefix")?;
        assert_eq!(surface.parse::<usize>()?, n % 2);
        receiver.ingest("cam0", record);
    }

    let out = receiver.output().context("transfer incomplete")?;
    assert_eq!(out.file_name, "received_file.xlsx");
    assert_eq!(&out.data[..], &data[..]);
    Ok(())
}

/// A name with nothing after its last dot still produces a transfer the
/// receiver can finish.
#[test]
fn test_trailing_dot_name_completes() -> Result<()> {
    let data = test_bytes(300);
    let symbols = encode_file(&data, "notes.", EncodingPolicy::Direct, WireFormat::Compact);
    let receiver = Receiver::new(CompletionPolicy::Strict);
    for line in records(&symbols, WireFormat::Compact) {
        assert!(!matches!(
            receiver.ingest("cam0", &line),
            IngestOutcome::Malformed(_)
        ));
    }

    let out = receiver.output().context("transfer incomplete")?;
    assert_eq!(&out.data[..], &data[..]);
    Ok(())
}

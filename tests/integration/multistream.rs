use crate::fault::FanoutSink;
use crate::*;

use glint_services::{spawn_capture, LoopbackSink, ScanEvent};

// ══════════════════════════════════════════════════════════════════════════════
//  Multiple capture streams into one receiver
// ══════════════════════════════════════════════════════════════════════════════

/// Dual-display sender: even symbols on surface 0, odd on surface 1, one
/// camera per surface. Neither camera alone sees the whole file; the shared
/// store does.
#[tokio::test(start_paused = true)]
async fn test_dual_surface_cameras_complete_together() -> Result<()> {
    let data = test_bytes(1_250);
    let scheduler = scheduler_for(
        &data,
        "photo.jpg",
        WireFormat::Compact,
        &sender_config(20, SendMode::SingleShot, 2),
    )?;
    let receiver = Receiver::new(CompletionPolicy::Strict);
    let (cam0, stream0) = spawn_capture("cam0", receiver.clone());
    let (cam1, stream1) = spawn_capture("cam1", receiver.clone());

    let sink = Arc::new(LoopbackSink::new(vec![cam0, cam1]));
    let (shutdown, sender) = spawn_sender(&scheduler, sink);
    scheduler.start(None)?;

    let out = receiver.wait_complete().await.context("receiver was reset")?;
    assert_eq!(&out.data[..], &data[..]);
    assert_eq!(out.file_name, "received_file.jpg");

    shutdown.send(())?;
    sender.await??;
    drop(scheduler);

    // The sink owned the capture senders; with the sender task gone the
    // streams drain and close.
    let even = stream0.await??;
    let odd = stream1.await??;
    assert_eq!(even.stored, 7);
    assert_eq!(odd.stored, 6);

    let deliveries = receiver.current();
    assert!(deliveries.deliveries().multi_stream_indices().is_empty());
    Ok(())
}

/// Two cameras on the same display: every symbol arrives twice, the second
/// sighting is absorbed, and completion fires once.
#[tokio::test(start_paused = true)]
async fn test_overlapping_cameras_fire_once() -> Result<()> {
    let data = test_bytes(800);
    let scheduler = scheduler_for(
        &data,
        "data.csv",
        WireFormat::Legacy,
        &sender_config(30, SendMode::SingleShot, 1),
    )?;
    let receiver = Receiver::new(CompletionPolicy::Strict);
    let (cam0, stream0) = spawn_capture("cam0", receiver.clone());
    let (cam1, stream1) = spawn_capture("cam1", receiver.clone());

    let sink = Arc::new(FanoutSink::new(vec![
        Arc::new(LoopbackSink::new(vec![cam0])),
        Arc::new(LoopbackSink::new(vec![cam1])),
    ]));
    let (shutdown, sender) = spawn_sender(&scheduler, sink);
    scheduler.start(None)?;

    let out = receiver.wait_complete().await.context("receiver was reset")?;
    assert_eq!(&out.data[..], &data[..]);
    assert_eq!(out.file_name, "data.csv");

    shutdown.send(())?;
    sender.await??;
    drop(scheduler);

    let a = stream0.await??;
    let b = stream1.await??;
    assert_eq!(a.stored + b.stored, 8);
    assert_eq!(a.duplicates + b.duplicates, 8);
    assert_eq!(
        receiver.current().deliveries().multi_stream_indices(),
        (0..8).collect::<Vec<u32>>()
    );
    Ok(())
}

/// One camera dies mid-transfer. Its stream ends with a device error; the
/// other keeps going and the transfer still completes.
#[tokio::test]
async fn test_camera_fault_is_stream_local() -> Result<()> {
    let data = test_bytes(600);
    let symbols = encode_file(&data, "a.bin", EncodingPolicy::Direct, WireFormat::Compact);
    let lines = records(&symbols, WireFormat::Compact);
    let receiver = Receiver::new(CompletionPolicy::Strict);

    let (bad, bad_stream) = spawn_capture("cam0", receiver.clone());
    let (good, good_stream) = spawn_capture("cam1", receiver.clone());

    for line in &lines[..2] {
        bad.send(ScanEvent::Decoded(line.clone())).await?;
    }
    bad.send(ScanEvent::Fault("sensor timeout".into())).await?;
    // Frames queued behind the fault are never read.
    let _ = bad.send(ScanEvent::Decoded(lines[2].clone())).await;
    assert!(bad_stream.await?.is_err());

    for line in &lines[2..] {
        good.send(ScanEvent::Nothing).await?;
        good.send(ScanEvent::Decoded(line.clone())).await?;
    }
    let out = receiver.wait_complete().await.context("receiver was reset")?;
    assert_eq!(&out.data[..], &data[..]);

    drop(good);
    let stats = good_stream.await??;
    assert_eq!(stats.stored, 4);
    assert_eq!(stats.empty, 4);
    Ok(())
}

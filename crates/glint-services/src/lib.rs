//! glint-services — the receiving and sending halves of a Glint transfer.
//!
//! Receiver side: capture streams feed a shared `Receiver`, which owns the
//! current session, its chunk store, and the completion monitor.
//! Sender side: a `SenderScheduler` paces pre-encoded records into a
//! `SymbolSink`.

pub mod capture;
pub mod chunk_store;
pub mod delivery;
pub mod reassembler;
pub mod receiver;
pub mod scheduler;
pub mod sink;

pub use capture::{
    spawn_capture, CaptureError, CaptureStats, CaptureStream, ScanEvent, CAPTURE_QUEUE_DEPTH,
};
pub use chunk_store::{ChunkStore, InsertOutcome};
pub use delivery::DeliveryTracker;
pub use reassembler::{write_artifact, Assembled, GapPolicy};
pub use receiver::{
    CompletionPolicy, IngestOutcome, ReceiveProgress, Receiver, ReceiverSession, Session,
    SessionInfo,
};
pub use scheduler::{SchedulerError, SendProgress, SendState, SenderScheduler};
pub use sink::{Emission, LineSink, LoopbackSink, MemorySink, SinkError, SymbolSink};

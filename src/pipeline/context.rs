//! Pipeline channels: queued items go out to assembly workers, assembled results come back.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::thread::JoinHandle;

use crate::Document;
use crate::engine::db_ops::QueuedItem;
use crate::error::AssemblyError;

/// One assembled (or failed) queue entry, sent back to the orchestrator.
pub struct AssemblyResult {
    pub key: String,
    pub depth: i64,
    pub outcome: Result<Document, AssemblyError>,
}

/// Job and result channels. Workers get job_rx and result_tx; the orchestrator keeps the other ends.
pub struct PipelineChannels {
    pub job_tx: Sender<QueuedItem>,
    pub job_rx: Receiver<QueuedItem>,
    pub result_tx: Sender<AssemblyResult>,
    pub result_rx: Receiver<AssemblyResult>,
}

/// Handles returned by [`start_pipeline`](super::start_pipeline). Drop `job_tx` then join workers when done.
pub struct PipelineHandles {
    pub job_tx: Sender<QueuedItem>,
    pub result_rx: Receiver<AssemblyResult>,
    pub worker_handles: Vec<JoinHandle<()>>,
}

/// Both channels hold one full batch so dispatch never blocks on workers.
pub fn create_pipeline_channels(batch_size: usize) -> PipelineChannels {
    let cap = batch_size.max(1);
    let (job_tx, job_rx) = bounded::<QueuedItem>(cap);
    let (result_tx, result_rx) = bounded::<AssemblyResult>(cap);
    PipelineChannels {
        job_tx,
        job_rx,
        result_tx,
        result_rx,
    }
}

use crossbeam_channel::{Receiver, Sender};
use log::trace;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::AclPolicy;
use crate::engine::assembler::Assembler;
use crate::engine::db_ops::QueuedItem;
use crate::source::Source;

use super::context::AssemblyResult;

/// Single assembly worker: read items from job_rx, assemble, send on result_tx.
fn assembly_worker_loop(
    job_rx: Receiver<QueuedItem>,
    result_tx: Sender<AssemblyResult>,
    source: Arc<dyn Source>,
    policy: AclPolicy,
    max_content_bytes: u64,
) {
    let assembler = Assembler::new(source.as_ref(), policy, max_content_bytes);
    while let Ok(item) = job_rx.recv() {
        trace!("assembling {} (attempt {})", item.key, item.attempts + 1);
        let outcome = assembler.assemble(&item.payload);
        let result = AssemblyResult {
            key: item.key,
            depth: item.depth,
            outcome,
        };
        if result_tx.send(result).is_err() {
            break;
        }
    }
}

/// Spawn assembly workers. Caller must drop its job sender when done so workers exit.
pub fn spawn_assembly_workers(
    job_rx: Receiver<QueuedItem>,
    result_tx: &Sender<AssemblyResult>,
    source: Arc<dyn Source>,
    policy: AclPolicy,
    max_content_bytes: u64,
    num_threads: usize,
) -> Vec<JoinHandle<()>> {
    (0..num_threads.max(1))
        .map(|_| {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let source = Arc::clone(&source);
            thread::spawn(move || {
                assembly_worker_loop(job_rx, result_tx, source, policy, max_content_bytes)
            })
        })
        .collect()
}

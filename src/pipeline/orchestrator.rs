use anyhow::{Context, Result, bail};
use crossbeam_channel::RecvTimeoutError;
use log::{debug, info, warn};
use rusqlite::Connection;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::engine::assembler::Assembler;
use crate::engine::db_ops::{
    self, ApplyOutcome, Phase, apply_document, begin_generation, clear_parked, complete_generation,
    enqueue, indexed_in_generation, keep_subtree, load_checkpoint, load_item, park, parked_keys,
    queue_len, record_failure, record_resume, remove_queued, reset_attempts, sweep_stale,
    take_batch,
};
use crate::engine::directory::list_principals;
use crate::engine::identity::{list_identity_groups, list_identity_users};
use crate::engine::progress::{ProgressBar, create_counter, finish_bar, update_progress_bar};
use crate::source::Source;
use crate::utils::config::CANCEL_POLL_MS;
use crate::{Document, IdentityStats, Opts, SyncStats};

use super::context::{AssemblyResult, PipelineHandles, create_pipeline_channels};
use super::workers::spawn_assembly_workers;

/// Start assembly workers over fresh channels.
pub fn start_pipeline(source: Arc<dyn Source>, opts: &Opts) -> PipelineHandles {
    let channels = create_pipeline_channels(opts.batch_size);
    let worker_handles = spawn_assembly_workers(
        channels.job_rx,
        &channels.result_tx,
        source,
        opts.acl_policy,
        opts.max_content_bytes,
        opts.workers,
    );
    // Dropping the last sender lets result_rx report disconnection if every worker dies.
    drop(channels.result_tx);
    PipelineHandles {
        job_tx: channels.job_tx,
        result_rx: channels.result_rx,
        worker_handles,
    }
}

/// Drop the job sender and join workers.
pub fn shutdown_pipeline(handles: PipelineHandles) {
    let PipelineHandles {
        job_tx,
        result_rx,
        worker_handles,
    } = handles;
    drop(job_tx);
    drop(result_rx);
    for h in worker_handles {
        let _ = h.join();
    }
}

fn is_cancelled(cancel: &Option<Arc<AtomicBool>>) -> bool {
    cancel
        .as_ref()
        .is_some_and(|c| c.load(Ordering::Relaxed))
}

/// Resume the open generation when possible, otherwise start a new one and queue every member root.
/// A generation already resumed `max_resumes` times is abandoned for a fresh traversal.
fn prepare_generation(
    source: &dyn Source,
    conn: &mut Connection,
    opts: &Opts,
    stats: &mut SyncStats,
) -> Result<i64> {
    let checkpoint = load_checkpoint(conn)?;
    let open = checkpoint.phase == Phase::Traversing && queue_len(conn)? > 0;
    if open && !opts.restart && checkpoint.resumes < opts.max_resumes {
        let resumes = record_resume(conn, checkpoint.generation)?;
        let reset = reset_attempts(conn)?;
        info!(
            "Resuming generation {} ({} queued, {} retried, resume {}/{})",
            checkpoint.generation,
            queue_len(conn)?,
            reset,
            resumes,
            opts.max_resumes
        );
        return Ok(checkpoint.generation);
    }
    if open && !opts.restart {
        warn!(
            "Generation {} still failing after {} resumes; starting over",
            checkpoint.generation, checkpoint.resumes
        );
    } else if opts.restart && checkpoint.phase == Phase::Traversing {
        warn!(
            "Discarding unfinished generation {}",
            checkpoint.generation
        );
    }
    let generation = begin_generation(conn)?;
    let enumeration = list_principals(source, &opts.allow_list)?;
    let tx = conn.transaction().context("begin transaction")?;
    for root in &enumeration.roots {
        enqueue(&tx, root, 0)?;
    }
    tx.commit().context("commit roots")?;
    info!(
        "Generation {}: {} member roots ({} skipped)",
        generation, enumeration.retained, enumeration.skipped
    );
    stats.roots = enumeration.roots.len();
    Ok(generation)
}

/// Store one result. Success writes the item, queues unseen children one level deeper and
/// drops the queue entry, all in one transaction. A retryable failure bumps the attempt count;
/// any other failure parks the entry so it no longer holds the generation open.
fn apply_result(
    conn: &mut Connection,
    generation: i64,
    result: AssemblyResult,
    stats: &mut SyncStats,
) -> Result<()> {
    let AssemblyResult {
        key,
        depth,
        outcome,
    } = result;
    let doc = match outcome {
        Ok(doc) => doc,
        Err(e) if e.is_retryable() => {
            warn!("{}", e);
            record_failure(conn, &key, &e.to_string())?;
            stats.failed += 1;
            return Ok(());
        }
        Err(e) => {
            warn!("{}; skipping", e);
            park(conn, &key, &e.to_string())?;
            stats.skipped += 1;
            return Ok(());
        }
    };

    let tx = conn.transaction().context("begin transaction")?;
    let applied = apply_document(&tx, &key, &doc, generation)?;
    if let Document::Container(container) = &doc {
        for child in &container.children {
            if !indexed_in_generation(&tx, &child.key, generation)? {
                enqueue(&tx, child, depth + 1)?;
            }
        }
    }
    remove_queued(&tx, &key)?;
    tx.commit().context("commit item")?;

    debug!("{}: {:?}", key, applied);
    match applied {
        ApplyOutcome::Added => stats.added += 1,
        ApplyOutcome::Modified => stats.modified += 1,
        ApplyOutcome::Unchanged => stats.unchanged += 1,
        ApplyOutcome::Deleted => stats.deleted += 1,
        ApplyOutcome::Absent => {}
    }
    Ok(())
}

/// Dispatch queue batches to workers and apply results until the queue is drained
/// (or only exhausted items remain) or cancellation is requested.
fn drain_queue(
    handles: &PipelineHandles,
    conn: &mut Connection,
    opts: &Opts,
    generation: i64,
    cancel: &Option<Arc<AtomicBool>>,
    bar: &Option<ProgressBar>,
    stats: &mut SyncStats,
) -> Result<()> {
    let poll = Duration::from_millis(CANCEL_POLL_MS);
    while !is_cancelled(cancel) {
        let batch = take_batch(conn, opts.batch_size, opts.max_attempts)?;
        if batch.is_empty() {
            break;
        }
        let sent = batch.len();
        debug!("Dispatching {} queued items", sent);
        for item in batch {
            handles
                .job_tx
                .send(item)
                .map_err(|_| anyhow::anyhow!("assembly workers exited"))?;
        }

        let mut received = 0;
        let mut cancel_logged = false;
        while received < sent {
            match handles.result_rx.recv_timeout(poll) {
                Ok(result) => {
                    received += 1;
                    apply_result(conn, generation, result, stats)?;
                    if let Some(bar) = bar {
                        update_progress_bar(bar, 1);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !cancel_logged && is_cancelled(cancel) {
                        info!("Cancel requested; finishing {} in-flight items", sent - received);
                        cancel_logged = true;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => bail!("assembly workers exited"),
            }
        }
    }
    Ok(())
}

/// Keep what parked nodes had indexed, drop them from the queue, sweep and mark the generation done.
fn finish_generation(conn: &mut Connection, generation: i64) -> Result<usize> {
    let tx = conn.transaction().context("begin transaction")?;
    for key in parked_keys(&tx)? {
        let kept = keep_subtree(&tx, &key, generation)?;
        debug!("{}: skipped, kept {} indexed items", key, kept);
    }
    clear_parked(&tx)?;
    let swept = sweep_stale(&tx, generation)?;
    complete_generation(&tx, generation)?;
    tx.commit().context("commit generation")?;
    Ok(swept)
}

/// Content sync: breadth-first traversal of every retained member's tree into the index at `conn`.
///
/// Progress is checkpointed in the queue table, so an interrupted run resumes where it stopped.
/// Items left over from earlier generations are swept only when every queued node succeeded.
pub fn run_content_sync(
    source: Arc<dyn Source>,
    conn: &mut Connection,
    opts: &Opts,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<SyncStats> {
    let mut stats = SyncStats::default();
    let generation = prepare_generation(source.as_ref(), conn, opts, &mut stats)?;

    let bar = opts.verbose.then(|| create_counter("Syncing"));
    let handles = start_pipeline(source, opts);
    let drained = drain_queue(&handles, conn, opts, generation, &cancel, &bar, &mut stats);
    shutdown_pipeline(handles);
    if let Some(bar) = &bar {
        finish_bar(bar);
    }
    drained?;

    stats.remaining = queue_len(conn)?;
    if is_cancelled(&cancel) {
        bail!(
            "Sync cancelled; {} queued items resume on the next run",
            stats.remaining
        );
    }
    if stats.remaining == 0 {
        stats.swept = finish_generation(conn, generation)?;
        info!(
            "Generation {} complete; swept {} stale items",
            generation, stats.swept
        );
    } else {
        warn!(
            "{} items still failing after {} attempts; generation {} stays open and nothing is swept",
            stats.remaining, opts.max_attempts, generation
        );
    }
    Ok(stats)
}

/// Re-assemble one indexed item from its stored state and write it back in place.
/// Children are not queued; the next content sync picks up structural changes.
pub fn refetch_item(
    source: &dyn Source,
    conn: &Connection,
    key: &str,
    opts: &Opts,
) -> Result<ApplyOutcome> {
    let Some(item) = load_item(conn, key)? else {
        bail!("{} is not in the index", key);
    };
    let assembler = Assembler::new(source, opts.acl_policy, opts.max_content_bytes);
    let doc = assembler
        .assemble(&item.state)
        .with_context(|| format!("refetch {}", key))?;
    let applied = apply_document(conn, key, &doc, item.generation)?;
    info!("{}: {:?}", key, applied);
    Ok(applied)
}

/// Identity sync: replace the identity tables with the current users and group rosters.
pub fn run_identity_sync(source: &dyn Source, conn: &mut Connection) -> Result<IdentityStats> {
    let users = list_identity_users(source)?;
    let groups = list_identity_groups(source)?;
    db_ops::replace_identities(conn, &users, &groups)?;
    let (users, groups, memberships) = db_ops::identity_counts(conn)?;
    info!(
        "Identities: {} users, {} groups, {} memberships",
        users, groups, memberships
    );
    Ok(IdentityStats {
        users,
        groups,
        memberships,
    })
}

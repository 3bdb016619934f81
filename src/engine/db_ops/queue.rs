//! Work queue of descriptors waiting to be assembled. Together with the checkpoint row
//! this is what lets an interrupted traversal resume.

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::Descriptor;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedItem {
    pub key: String,
    pub payload: Vec<u8>,
    pub depth: i64,
    pub attempts: u32,
}

/// Queue `descriptor` at `depth`. A key already queued gets the newer payload, a fresh attempt
/// count and is unparked.
pub fn enqueue(conn: &Connection, descriptor: &Descriptor, depth: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO queue (key, payload, depth, attempts, parked, last_error)
         VALUES (?1, ?2, ?3, 0, 0, NULL)
         ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, depth = excluded.depth,
             attempts = 0, parked = 0, last_error = NULL",
        (descriptor.key.as_str(), descriptor.payload.as_slice(), depth),
    )
    .context("enqueue descriptor")?;
    Ok(())
}

/// Up to `limit` unparked entries below `max_attempts`, shallowest first (breadth-first order).
pub fn take_batch(conn: &Connection, limit: usize, max_attempts: u32) -> Result<Vec<QueuedItem>> {
    let mut stmt = conn
        .prepare(
            "SELECT key, payload, depth, attempts FROM queue WHERE parked = 0 AND attempts < ?1
             ORDER BY depth, key LIMIT ?2",
        )
        .context("prepare take batch")?;
    let rows = stmt.query_map((max_attempts, limit as i64), |row| {
        Ok(QueuedItem {
            key: row.get(0)?,
            payload: row.get(1)?,
            depth: row.get(2)?,
            attempts: row.get(3)?,
        })
    })?;
    let mut batch = Vec::new();
    for row in rows {
        batch.push(row?);
    }
    Ok(batch)
}

pub fn remove_queued(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM queue WHERE key = ?1", [key])
        .context("remove queued")?;
    Ok(())
}

/// Bump the attempt count of `key` and remember the error.
pub fn record_failure(conn: &Connection, key: &str, message: &str) -> Result<()> {
    conn.execute(
        "UPDATE queue SET attempts = attempts + 1, last_error = ?2 WHERE key = ?1",
        (key, message),
    )
    .context("record failure")?;
    Ok(())
}

/// Set `key` aside after a failure that retrying can not fix. Parked entries are never
/// dispatched again and do not hold the generation open.
pub fn park(conn: &Connection, key: &str, message: &str) -> Result<()> {
    conn.execute(
        "UPDATE queue SET parked = 1, last_error = ?2 WHERE key = ?1",
        (key, message),
    )
    .context("park queued")?;
    Ok(())
}

pub fn parked_keys(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT key FROM queue WHERE parked = 1 ORDER BY key")
        .context("prepare parked keys")?;
    let keys = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(keys)
}

pub fn clear_parked(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM queue WHERE parked = 1", [])
        .context("clear parked")
}

/// Give every unparked entry a fresh set of attempts (on resume).
pub fn reset_attempts(conn: &Connection) -> Result<usize> {
    conn.execute(
        "UPDATE queue SET attempts = 0 WHERE parked = 0 AND attempts > 0",
        [],
    )
    .context("reset attempts")
}

/// Unparked entries, i.e. work that still holds the generation open.
pub fn queue_len(conn: &Connection) -> Result<usize> {
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM queue WHERE parked = 0", [], |row| {
            row.get(0)
        })
        .context("count queue")?;
    Ok(n.max(0) as usize)
}

/// Entries still eligible for another attempt.
pub fn pending_count(conn: &Connection, max_attempts: u32) -> Result<usize> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM queue WHERE parked = 0 AND attempts < ?1",
            [max_attempts],
            |row| row.get(0),
        )
        .context("count pending")?;
    Ok(n.max(0) as usize)
}

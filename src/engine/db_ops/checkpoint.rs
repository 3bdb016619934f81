//! Sync checkpoint: current generation and whether a traversal is in progress.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

/// Traversal phase recorded in the checkpoint row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Traversing,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Traversing => "traversing",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "traversing" => Phase::Traversing,
            _ => Phase::Idle,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    pub generation: i64,
    pub phase: Phase,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    /// Runs that picked this generation up again after it was left open.
    pub resumes: u32,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            generation: 0,
            phase: Phase::Idle,
            started_at: None,
            completed_at: None,
            resumes: 0,
        }
    }
}

/// Current checkpoint; generation 0 / idle when none was written yet.
pub fn load_checkpoint(conn: &Connection) -> Result<Checkpoint> {
    let row = conn
        .query_row(
            "SELECT generation, phase, started_at, completed_at, resumes FROM checkpoint WHERE id = 1",
            [],
            |row| {
                Ok(Checkpoint {
                    generation: row.get(0)?,
                    phase: Phase::parse(&row.get::<_, String>(1)?),
                    started_at: row.get(2)?,
                    completed_at: row.get(3)?,
                    resumes: row.get(4)?,
                })
            },
        )
        .optional()
        .context("load checkpoint")?;
    Ok(row.unwrap_or_default())
}

/// Start a new traversal generation: bump the counter, mark traversing, clear the queue.
pub fn begin_generation(conn: &mut Connection) -> Result<i64> {
    let next = load_checkpoint(conn)?.generation + 1;
    let tx = conn.transaction().context("begin transaction")?;
    tx.execute("DELETE FROM queue", []).context("clear queue")?;
    tx.execute(
        "INSERT INTO checkpoint (id, generation, phase, started_at, completed_at, resumes)
         VALUES (1, ?1, ?2, ?3, NULL, 0)
         ON CONFLICT(id) DO UPDATE SET generation = excluded.generation,
             phase = excluded.phase, started_at = excluded.started_at, completed_at = NULL,
             resumes = 0",
        (next, Phase::Traversing.as_str(), Utc::now().to_rfc3339()),
    )
    .context("write checkpoint")?;
    tx.commit().context("commit checkpoint")?;
    Ok(next)
}

/// Mark `generation` complete.
pub fn complete_generation(conn: &Connection, generation: i64) -> Result<()> {
    conn.execute(
        "UPDATE checkpoint SET phase = ?1, completed_at = ?2 WHERE id = 1 AND generation = ?3",
        (Phase::Idle.as_str(), Utc::now().to_rfc3339(), generation),
    )
    .context("complete checkpoint")?;
    Ok(())
}

/// Count one more resume of `generation`; returns the new count.
pub fn record_resume(conn: &Connection, generation: i64) -> Result<u32> {
    conn.execute(
        "UPDATE checkpoint SET resumes = resumes + 1 WHERE id = 1 AND generation = ?1",
        [generation],
    )
    .context("record resume")?;
    Ok(load_checkpoint(conn)?.resumes)
}

//! Indexed items: apply assembled documents, classify changes by fingerprint, sweep stale items.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::{Document, Reader};

/// What applying one document did to the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Added,
    Modified,
    Unchanged,
    Deleted,
    /// Delete instruction for a key that was not indexed.
    Absent,
}

/// One row of the items table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredItem {
    pub key: String,
    pub kind: String,
    pub title: String,
    pub state: Vec<u8>,
    pub acl: Vec<Reader>,
    pub modified: Option<String>,
    pub size: u64,
    pub content_type: Option<String>,
    pub content: Option<Vec<u8>>,
    pub generation: i64,
}

/// Row values derived from a document, before the fingerprint is compared.
struct ItemRow<'a> {
    kind: &'a str,
    title: &'a str,
    state: &'a [u8],
    acl: String,
    modified: Option<String>,
    size: u64,
    content_type: Option<&'a str>,
    content: Option<&'a [u8]>,
}

/// blake3 over everything the index would show for the item.
pub fn fingerprint(
    title: &str,
    acl_json: &str,
    state: &[u8],
    content_type: Option<&str>,
    content: Option<&[u8]>,
) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in [
        title.as_bytes(),
        acl_json.as_bytes(),
        state,
        content_type.unwrap_or("").as_bytes(),
        content.unwrap_or(&[]),
    ] {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

fn row_for(doc: &Document) -> Result<Option<ItemRow<'_>>> {
    let row = match doc {
        Document::Container(c) => ItemRow {
            kind: c.kind.as_str(),
            title: &c.title,
            state: &c.state,
            acl: serde_json::to_string(&c.acl).context("serialize acl")?,
            modified: None,
            size: 0,
            content_type: None,
            content: None,
        },
        Document::Content(c) => ItemRow {
            kind: "file",
            title: &c.title,
            state: &c.state,
            acl: serde_json::to_string(&c.acl).context("serialize acl")?,
            modified: Some(c.modified.to_rfc3339()),
            size: c.size,
            content_type: c.content.as_ref().map(|x| x.content_type.as_str()),
            content: c.content.as_ref().map(|x| x.bytes.as_slice()),
        },
        Document::Delete(_) => return Ok(None),
    };
    Ok(Some(row))
}

fn stored_fingerprint(conn: &Connection, key: &str) -> Result<Option<Vec<u8>>> {
    conn.query_row(
        "SELECT fingerprint FROM items WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
    .context("load fingerprint")
}

/// Write `doc` under `key` for `generation`. Unchanged items only get their generation bumped.
pub fn apply_document(
    conn: &Connection,
    key: &str,
    doc: &Document,
    generation: i64,
) -> Result<ApplyOutcome> {
    let existing = stored_fingerprint(conn, key)?;
    let Some(row) = row_for(doc)? else {
        if existing.is_none() {
            return Ok(ApplyOutcome::Absent);
        }
        conn.execute("DELETE FROM items WHERE key = ?1", [key])
            .context("delete item")?;
        return Ok(ApplyOutcome::Deleted);
    };

    let fp = fingerprint(row.title, &row.acl, row.state, row.content_type, row.content);
    if existing.as_deref() == Some(fp.as_slice()) {
        conn.execute(
            "UPDATE items SET generation = ?2 WHERE key = ?1",
            (key, generation),
        )
        .context("touch item")?;
        return Ok(ApplyOutcome::Unchanged);
    }

    conn.execute(
        "INSERT OR REPLACE INTO items
         (key, kind, title, state, acl, modified, size, content_type, content, fingerprint, generation)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            key,
            row.kind,
            row.title,
            row.state,
            row.acl,
            row.modified,
            i64::try_from(row.size).unwrap_or(i64::MAX),
            row.content_type,
            row.content,
            fp.as_slice(),
            generation,
        ],
    )
    .context("upsert item")?;
    Ok(if existing.is_some() {
        ApplyOutcome::Modified
    } else {
        ApplyOutcome::Added
    })
}

/// True if `key` was already written during `generation` (skip re-queueing it).
pub fn indexed_in_generation(conn: &Connection, key: &str, generation: i64) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM items WHERE key = ?1 AND generation = ?2",
            (key, generation),
            |_| Ok(()),
        )
        .optional()
        .context("check item generation")?;
    Ok(found.is_some())
}

/// Carry `key` and everything stored below it into `generation`, so a node that could not be
/// read this time keeps its last indexed subtree instead of being swept.
pub fn keep_subtree(conn: &Connection, key: &str, generation: i64) -> Result<usize> {
    conn.execute(
        "UPDATE items SET generation = ?2
         WHERE generation < ?2 AND (key = ?1 OR substr(key, 1, length(?1) + 1) = ?1 || '/')",
        (key, generation),
    )
    .context("keep subtree")
}

/// Delete items not seen in `generation` (removed upstream). Returns how many were removed.
pub fn sweep_stale(conn: &Connection, generation: i64) -> Result<usize> {
    conn.execute("DELETE FROM items WHERE generation < ?1", [generation])
        .context("sweep stale items")
}

pub fn load_item(conn: &Connection, key: &str) -> Result<Option<StoredItem>> {
    let row = conn
        .query_row(
            "SELECT key, kind, title, state, acl, modified, size, content_type, content, generation
             FROM items WHERE key = ?1",
            [key],
            |row| {
                Ok((
                    StoredItem {
                        key: row.get(0)?,
                        kind: row.get(1)?,
                        title: row.get(2)?,
                        state: row.get(3)?,
                        acl: Vec::new(),
                        modified: row.get(5)?,
                        size: row.get::<_, i64>(6)?.max(0) as u64,
                        content_type: row.get(7)?,
                        content: row.get(8)?,
                        generation: row.get(9)?,
                    },
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()
        .context("load item")?;
    match row {
        None => Ok(None),
        Some((mut item, acl)) => {
            item.acl = serde_json::from_str(&acl).context("parse stored acl")?;
            Ok(Some(item))
        }
    }
}

pub fn item_count(conn: &Connection) -> Result<usize> {
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
        .context("count items")?;
    Ok(n.max(0) as usize)
}

//! Database operations: schema, open, checkpoint, work queue, indexed items, identities.

mod checkpoint;
mod connection;
mod identities;
mod indexer;
mod queue;

pub use checkpoint::{
    Checkpoint, Phase, begin_generation, complete_generation, load_checkpoint, record_resume,
};
pub use connection::{open_db, open_db_in_memory};
pub use identities::{identity_counts, replace_identities};
pub use indexer::{
    ApplyOutcome, StoredItem, apply_document, fingerprint, indexed_in_generation, item_count,
    keep_subtree, load_item, sweep_stale,
};
pub use queue::{
    QueuedItem, clear_parked, enqueue, park, parked_keys, pending_count, queue_len, record_failure,
    remove_queued, reset_attempts, take_batch,
};

/// WAL tuning pragmas (synchronous, autocheckpoint, size limit). Use after PRAGMA journal_mode = WAL.
pub(crate) const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        "#;

/// Schema for checkpoint, queue, items and identity tables.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoint (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    generation INTEGER NOT NULL,
    phase TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    resumes INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS queue (
    key TEXT PRIMARY KEY,
    payload BLOB NOT NULL,
    depth INTEGER NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    parked INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);
CREATE INDEX IF NOT EXISTS idx_queue_order ON queue(depth, key);

CREATE TABLE IF NOT EXISTS items (
    key TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    state BLOB NOT NULL,
    acl TEXT NOT NULL,
    modified TEXT,
    size INTEGER NOT NULL DEFAULT 0,
    content_type TEXT,
    content BLOB,
    fingerprint BLOB NOT NULL,
    generation INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_items_generation ON items(generation);

CREATE TABLE IF NOT EXISTS identity_users (
    email TEXT PRIMARY KEY,
    external_id TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS identity_groups (
    name TEXT PRIMARY KEY
);
CREATE TABLE IF NOT EXISTS identity_memberships (
    group_name TEXT NOT NULL,
    email TEXT NOT NULL,
    PRIMARY KEY (group_name, email)
);
"#;

//! Dropdex: sync a Dropbox team's folders, files and sharing permissions into a search index.
//!
//! The engine (traversal state, sharing resolution, document assembly, identity mapping)
//! is host-agnostic and talks to the source through [`source::Source`]. The bundled host
//! keeps the index, work queue and checkpoint in SQLite.

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use engine::state::{NodeKind, TraversalState};
pub use error::{
    AssemblyError, ConfigError, DecodeError, EnumerationError, SharingError, TransportError,
    TraversalError,
};

use log::debug;
use rusqlite::Connection;
use std::sync::Arc;

/// Result alias used by public dropdex API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Run one content sync of `source` into `conn` with `opts`. No cancellation hook.
///
/// Resumes an unfinished traversal unless `opts.restart` is set; see
/// [`run_content_sync`](crate::pipeline::run_content_sync).
pub fn sync_content(
    source: Arc<dyn source::Source>,
    conn: &mut Connection,
    opts: &Opts,
) -> Result<SyncStats> {
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_string().to_uppercase(),
        opts
    );
    pipeline::run_content_sync(source, conn, opts, None)
}

/// Replace the identity tables in `conn` with the users and groups of `source`.
pub fn sync_identities(source: &dyn source::Source, conn: &mut Connection) -> Result<IdentityStats> {
    pipeline::run_identity_sync(source, conn)
}

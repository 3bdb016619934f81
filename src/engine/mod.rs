//! Engine: traversal, sharing, assembly and identity logic, plus the index store and CLI.

pub mod arg_parser;
pub mod assembler;
pub mod cli;
pub mod db_ops;
pub mod directory;
pub mod identity;
pub mod pages;
pub mod path;
pub mod progress;
pub mod sharing;
pub mod state;
pub mod walker;

// Re-export commonly used functions
pub use arg_parser::Cli;
pub use assembler::{Assembler, dedupe_readers};
pub use cli::handle_run;
pub use db_ops::{open_db, open_db_in_memory};
pub use directory::{list_members, list_principals};
pub use identity::{list_identity_groups, list_identity_users};
pub use pages::drain_pages;
pub use path::join;
pub use sharing::{resolve_container, resolve_file};
pub use walker::list_children;

//! Public and internal types for the dropdex API and pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use crate::engine::state::NodeKind;

// ---- Source-side records ----

/// One page of a paginated source listing. `cursor: Some` means more pages follow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl<T> Page<T> {
    /// Last page: no continuation.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: None,
        }
    }

    /// Page followed by more, resumable with `cursor`.
    pub fn more(items: Vec<T>, cursor: impl Into<String>) -> Self {
        Self {
            items,
            cursor: Some(cursor.into()),
        }
    }
}

/// A team member (principal). `email` may be absent; such members are left out of identity mapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl TeamMember {
    /// Identifier and display name must be non-empty for the member to own a traversal root.
    pub fn is_usable(&self) -> bool {
        !self.id.is_empty() && !self.display_name.is_empty()
    }
}

/// A team-level group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
}

/// One member of a group, as needed for identity mapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    #[serde(default)]
    pub member_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Kind of a folder-listing entry. Anything that is neither folder nor file is `Other` and skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Folder,
    File,
    #[serde(other)]
    Other,
}

/// One entry of a folder listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEntry {
    pub kind: EntryKind,
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub shared_folder_id: Option<String>,
    #[serde(default)]
    pub parent_shared_folder_id: Option<String>,
    #[serde(default)]
    pub downloadable: bool,
    #[serde(default)]
    pub server_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rev: Option<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub size: u64,
}

impl FolderEntry {
    pub fn folder(name: &str, path: &str, shared_folder_id: Option<&str>) -> Self {
        Self {
            kind: EntryKind::Folder,
            id: format!("id:{}", path.to_lowercase()),
            name: name.to_string(),
            path: path.to_string(),
            shared_folder_id: shared_folder_id.map(str::to_string),
            parent_shared_folder_id: None,
            downloadable: false,
            server_modified: None,
            client_modified: None,
            rev: None,
            content_hash: None,
            size: 0,
        }
    }

    pub fn file(name: &str, path: &str, server_modified: DateTime<Utc>, size: u64) -> Self {
        Self {
            kind: EntryKind::File,
            id: format!("id:{}", path.to_lowercase()),
            name: name.to_string(),
            path: path.to_string(),
            shared_folder_id: None,
            parent_shared_folder_id: None,
            downloadable: true,
            server_modified: Some(server_modified),
            client_modified: Some(server_modified),
            rev: None,
            content_hash: None,
            size,
        }
    }
}

/// One access grant on a shared folder or file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grant {
    /// Team member id.
    User(String),
    /// Group name.
    Group(String),
}

/// Downloaded file bytes plus their content type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Download {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

// ---- Engine outputs ----

/// Flattened membership of a shared folder or file. Built once, never mutated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SharingInfo {
    user_ids: Vec<String>,
    group_names: Vec<String>,
}

impl SharingInfo {
    pub fn new(user_ids: Vec<String>, group_names: Vec<String>) -> Self {
        Self {
            user_ids,
            group_names,
        }
    }

    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }
}

/// `(external key, opaque traversal state)` handed to the host for later materialization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub key: String,
    pub payload: Vec<u8>,
}

/// Index-side reader principal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Reader {
    User(String),
    Group(String),
}

/// Byte payload of a content document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Content {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Member root or folder document plus the descriptors of its immediate children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerDocument {
    pub kind: NodeKind,
    pub title: String,
    pub acl: Vec<Reader>,
    /// Re-encoded traversal state of this node.
    pub state: Vec<u8>,
    pub children: Vec<Descriptor>,
}

/// File document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDocument {
    pub title: String,
    pub acl: Vec<Reader>,
    pub state: Vec<u8>,
    /// Server-assigned modification time, unmodified.
    pub modified: DateTime<Utc>,
    pub size: u64,
    pub content: Option<Content>,
}

/// Why a node is turned into a delete instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteReason {
    /// Payload bytes could not be decoded.
    Undecodable,
    /// Payload decoded but fails validity rules.
    Invalid,
}

/// Result of materializing one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Document {
    Container(ContainerDocument),
    Content(ContentDocument),
    Delete(DeleteReason),
}

/// `(index identity, external identity)` pair for one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityUser {
    /// Email used as the index-side identity.
    pub index_identity: String,
    /// Team member id.
    pub external_identity: String,
}

/// Group roster for identity mapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityGroup {
    pub name: String,
    pub members: BTreeSet<String>,
}

/// Result of [`list_principals`](crate::engine::directory::list_principals).
#[derive(Clone, Debug, Default)]
pub struct Enumeration {
    pub roots: Vec<Descriptor>,
    pub retained: usize,
    pub skipped: usize,
}

/// Counters reported by a content sync run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub roots: usize,
    pub added: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Nodes set aside after a failure retrying can not fix (e.g. deleted since listing).
    pub skipped: usize,
    pub swept: usize,
    /// Queue entries left for the next run (failed past max attempts, or cancelled).
    pub remaining: usize,
}

/// Counters reported by an identity sync run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityStats {
    pub users: usize,
    pub groups: usize,
    pub memberships: usize,
}

/// Whether reader lists are deduplicated before being attached to documents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AclPolicy {
    pub dedupe: bool,
}

/// Full options (CLI and config file).
#[derive(Clone, Debug)]
pub struct Opts {
    /// Index database path. When None, uses `<config dir>/.dropdex`.
    pub db_path: Option<PathBuf>,
    /// Member ids to index. Empty means every member.
    pub allow_list: HashSet<String>,
    /// Worker threads assembling documents.
    pub workers: usize,
    /// Queue entries dispatched per round.
    pub batch_size: usize,
    /// A queued item failing this many times is left for the next run.
    pub max_attempts: u32,
    /// Runs that may resume one open generation before a fresh traversal replaces it.
    pub max_resumes: u32,
    /// Files declared larger than this are indexed without content.
    pub max_content_bytes: u64,
    pub acl_policy: AclPolicy,
    /// Show progress bar and debug logs.
    pub verbose: bool,
    /// Discard a resumable checkpoint and start a fresh traversal.
    pub restart: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            db_path: None,
            allow_list: HashSet::new(),
            workers: crate::utils::config::DEFAULT_WORKERS,
            batch_size: crate::utils::config::DEFAULT_BATCH_SIZE,
            max_attempts: crate::utils::config::DEFAULT_MAX_ATTEMPTS,
            max_resumes: crate::utils::config::DEFAULT_MAX_RESUMES,
            max_content_bytes: crate::utils::config::DEFAULT_MAX_CONTENT_BYTES,
            acl_policy: AclPolicy::default(),
            verbose: false,
            restart: false,
        }
    }
}

//! Traversal state: the opaque, replayable snapshot of one node handed to the host.
//!
//! Encoded as a field-tagged JSON object with an explicit schema version `v`.
//! Unknown fields are ignored and absent optional fields default, so payloads
//! persisted by older or newer builds keep decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::types::FolderEntry;

/// Schema version written by this build.
pub const STATE_VERSION: u32 = 1;

/// Required prefix of a team member id.
pub const MEMBER_ID_PREFIX: &str = "dbmid:";

fn current_version() -> u32 {
    STATE_VERSION
}

/// Node kind. `Unsupported` absorbs kinds this build does not know; such states are invalid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A member's root container.
    Member,
    Folder,
    File,
    #[serde(other)]
    Unsupported,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Member => "member",
            NodeKind::Folder => "folder",
            NodeKind::File => "file",
            NodeKind::Unsupported => "unsupported",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalState {
    #[serde(default = "current_version")]
    pub v: u32,
    pub kind: NodeKind,
    pub member_id: String,
    pub member_name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_shared_folder_id: Option<String>,
    #[serde(default)]
    pub downloadable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub size: u64,
}

impl TraversalState {
    fn bare(kind: NodeKind, member_id: &str, member_name: &str) -> Self {
        Self {
            v: STATE_VERSION,
            kind,
            member_id: member_id.to_string(),
            member_name: member_name.to_string(),
            id: String::new(),
            name: String::new(),
            path: String::new(),
            shared_folder_id: None,
            parent_shared_folder_id: None,
            downloadable: false,
            server_modified: None,
            client_modified: None,
            rev: None,
            content_hash: None,
            size: 0,
        }
    }

    /// Root container of one member.
    pub fn member_root(member_id: &str, member_name: &str) -> Self {
        Self::bare(NodeKind::Member, member_id, member_name)
    }

    /// Folder owned by `member_id`. Empty shared folder ids are treated as absent.
    pub fn folder(
        member_id: &str,
        member_name: &str,
        name: &str,
        path: &str,
        shared_folder_id: Option<&str>,
    ) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            shared_folder_id: shared_folder_id
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            ..Self::bare(NodeKind::Folder, member_id, member_name)
        }
    }

    /// File owned by `member_id`.
    pub fn file(
        member_id: &str,
        member_name: &str,
        name: &str,
        path: &str,
        downloadable: bool,
        server_modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            downloadable,
            server_modified,
            ..Self::bare(NodeKind::File, member_id, member_name)
        }
    }

    /// State of a listed folder or file, inheriting the owner from `parent`. None for other entry kinds.
    pub fn from_entry(parent: &TraversalState, entry: &FolderEntry) -> Option<Self> {
        use crate::types::EntryKind;

        let base = match entry.kind {
            EntryKind::Folder => Self::folder(
                &parent.member_id,
                &parent.member_name,
                &entry.name,
                &entry.path,
                entry.shared_folder_id.as_deref(),
            ),
            EntryKind::File => Self {
                client_modified: entry.client_modified,
                rev: entry.rev.clone(),
                content_hash: entry.content_hash.clone(),
                size: entry.size,
                ..Self::file(
                    &parent.member_id,
                    &parent.member_name,
                    &entry.name,
                    &entry.path,
                    entry.downloadable,
                    entry.server_modified,
                )
            },
            EntryKind::Other => return None,
        };
        Some(Self {
            id: entry.id.clone(),
            parent_shared_folder_id: entry
                .parent_shared_folder_id
                .clone()
                .filter(|s| !s.is_empty()),
            ..base
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        // Plain struct of strings/numbers/dates: serialization can not fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let state: Self = serde_json::from_slice(bytes)?;
        log::trace!("Decoded traversal state {:?}", state);
        Ok(state)
    }

    /// Validity rules: member id prefix, supported kind, display name, path for non-roots,
    /// server-modified time for files. Invalid states are deleted, never materialized.
    pub fn is_valid(&self) -> bool {
        if !self.member_id.starts_with(MEMBER_ID_PREFIX) || self.member_name.is_empty() {
            return false;
        }
        match self.kind {
            NodeKind::Member => true,
            NodeKind::Folder => !self.path.is_empty(),
            NodeKind::File => !self.path.is_empty() && self.server_modified.is_some(),
            NodeKind::Unsupported => false,
        }
    }

    /// Title used for documents: member name for roots, entry name (or last path segment) otherwise.
    pub fn title(&self) -> &str {
        match self.kind {
            NodeKind::Member => &self.member_name,
            _ if !self.name.is_empty() => &self.name,
            _ => super::path::file_name(&self.path),
        }
    }

    /// Source path to list or fetch: empty for a member root.
    pub fn source_path(&self) -> &str {
        match self.kind {
            NodeKind::Member => "",
            _ => &self.path,
        }
    }

    /// Short label for logs and errors.
    pub fn label(&self) -> String {
        format!("{} {}:{}", self.kind.as_str(), self.member_id, self.path)
    }
}

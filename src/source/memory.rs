//! Scripted in-process source. Pages are registered per call key; cursors are
//! `"<key>#<page index>"`. Used by tests and by `--fixture` offline runs.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};

use crate::error::{SourceResult, TransportError, TransportErrorKind};
use crate::{Download, FolderEntry, Grant, Group, GroupMember, Page, TeamMember};

use super::Source;

/// Downloadable file body in a fixture.
#[derive(Clone, Debug, Deserialize)]
pub struct FixtureFile {
    pub content_type: String,
    pub text: String,
}

/// JSON fixture layout. Each listing is a list of pages; map keys are
/// `"<member_id>:<path>"` for folder/file calls and the plain id otherwise.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub members: Vec<Vec<TeamMember>>,
    pub groups: Vec<Vec<Group>>,
    pub group_members: HashMap<String, Vec<Vec<GroupMember>>>,
    pub folders: HashMap<String, Vec<Vec<FolderEntry>>>,
    pub container_members: HashMap<String, Vec<Vec<Grant>>>,
    pub file_members: HashMap<String, Vec<Vec<Grant>>>,
    pub files: HashMap<String, FixtureFile>,
    /// Call keys that fail with a network error.
    pub fail: HashSet<String>,
}

#[derive(Default)]
pub struct MemorySource {
    pages: HashMap<String, Vec<Vec<serde_json::Value>>>,
    files: HashMap<String, Download>,
    failing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
    log: Mutex<Vec<String>>,
}

fn member_key(member_id: &str, path: &str) -> String {
    format!("{member_id}:{path}")
}

fn to_values<T: serde::Serialize>(pages: Vec<Vec<T>>) -> Vec<Vec<serde_json::Value>> {
    pages
        .into_iter()
        .map(|page| {
            page.into_iter()
                .filter_map(|item| serde_json::to_value(item).ok())
                .collect()
        })
        .collect()
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON fixture file.
    pub fn from_fixture_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read fixture {}", path.display()))?;
        let fixture: Fixture =
            serde_json::from_str(&s).with_context(|| format!("parse fixture {}", path.display()))?;
        Ok(Self::from_fixture(fixture))
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        let mut src = Self::new().with_members(fixture.members);
        src = src.with_groups(fixture.groups);
        for (group_id, pages) in fixture.group_members {
            src = src.with_group_members(&group_id, pages);
        }
        for (key, pages) in fixture.folders {
            src.insert(format!("list_folder:{key}"), to_values(pages));
        }
        for (key, pages) in fixture.container_members {
            src.insert(format!("list_container_members:{key}"), to_values(pages));
        }
        for (key, pages) in fixture.file_members {
            src.insert(format!("list_file_members:{key}"), to_values(pages));
        }
        for (key, file) in fixture.files {
            src.files.insert(
                format!("download_file:{key}"),
                Download {
                    content_type: file.content_type,
                    bytes: file.text.into_bytes(),
                },
            );
        }
        for key in fixture.fail {
            src.fail_on(&key);
        }
        src
    }

    fn insert(&mut self, key: String, pages: Vec<Vec<serde_json::Value>>) {
        self.pages.insert(key, pages);
    }

    pub fn with_members(mut self, pages: Vec<Vec<TeamMember>>) -> Self {
        self.insert("list_team_members".to_string(), to_values(pages));
        self
    }

    pub fn with_groups(mut self, pages: Vec<Vec<Group>>) -> Self {
        self.insert("list_groups".to_string(), to_values(pages));
        self
    }

    pub fn with_group_members(mut self, group_id: &str, pages: Vec<Vec<GroupMember>>) -> Self {
        self.insert(format!("list_group_members:{group_id}"), to_values(pages));
        self
    }

    pub fn with_folder(mut self, member_id: &str, path: &str, pages: Vec<Vec<FolderEntry>>) -> Self {
        self.insert(
            format!("list_folder:{}", member_key(member_id, path)),
            to_values(pages),
        );
        self
    }

    pub fn with_container_members(mut self, container_id: &str, pages: Vec<Vec<Grant>>) -> Self {
        self.insert(
            format!("list_container_members:{container_id}"),
            to_values(pages),
        );
        self
    }

    pub fn with_file_members(mut self, member_id: &str, path: &str, pages: Vec<Vec<Grant>>) -> Self {
        self.insert(
            format!("list_file_members:{}", member_key(member_id, path)),
            to_values(pages),
        );
        self
    }

    pub fn with_file(mut self, member_id: &str, path: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.files.insert(
            format!("download_file:{}", member_key(member_id, path)),
            Download {
                content_type: content_type.to_string(),
                bytes: bytes.to_vec(),
            },
        );
        self
    }

    /// Make every call with this key fail, e.g. `"list_container_members:sf1"`.
    pub fn fail_on(&self, call_key: &str) {
        self.failing.lock().unwrap().insert(call_key.to_string());
    }

    /// Let calls with this key succeed again.
    pub fn heal(&self, call_key: &str) {
        self.failing.lock().unwrap().remove(call_key);
    }

    /// Total number of capability calls made.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Call keys in the order they were made (cursor calls included).
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, key: &str) -> SourceResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(key.to_string());
        if self.failing.lock().unwrap().contains(key) {
            return Err(TransportError::network(format!("injected failure on {key}")));
        }
        Ok(())
    }

    fn page<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        cursor: Option<&str>,
    ) -> SourceResult<Page<T>> {
        self.record(key)?;
        let index = match cursor {
            None => 0,
            Some(c) => c
                .strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('#'))
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| {
                    TransportError::new(
                        TransportErrorKind::Api { status: 409 },
                        format!("invalid cursor {c:?} for {key}"),
                    )
                })?,
        };
        let Some(pages) = self.pages.get(key) else {
            return match index {
                0 => Ok(Page::last(Vec::new())),
                _ => Err(TransportError::new(
                    TransportErrorKind::Api { status: 409 },
                    format!("cursor past end for {key}"),
                )),
            };
        };
        let items = pages
            .get(index)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| TransportError::new(TransportErrorKind::Protocol, e.to_string()))?;
        let cursor = (index + 1 < pages.len()).then(|| format!("{key}#{}", index + 1));
        Ok(Page { items, cursor })
    }
}

impl Source for MemorySource {
    fn list_team_members(&self, cursor: Option<&str>) -> SourceResult<Page<TeamMember>> {
        self.page("list_team_members", cursor)
    }

    fn list_groups(&self, cursor: Option<&str>) -> SourceResult<Page<Group>> {
        self.page("list_groups", cursor)
    }

    fn list_group_members(
        &self,
        group_id: &str,
        cursor: Option<&str>,
    ) -> SourceResult<Page<GroupMember>> {
        self.page(&format!("list_group_members:{group_id}"), cursor)
    }

    fn list_folder(
        &self,
        member_id: &str,
        path: &str,
        cursor: Option<&str>,
    ) -> SourceResult<Page<FolderEntry>> {
        self.page(
            &format!("list_folder:{}", member_key(member_id, path)),
            cursor,
        )
    }

    fn list_container_members(
        &self,
        _member_id: &str,
        container_id: &str,
        cursor: Option<&str>,
    ) -> SourceResult<Page<Grant>> {
        self.page(&format!("list_container_members:{container_id}"), cursor)
    }

    fn list_file_members(
        &self,
        member_id: &str,
        path: &str,
        cursor: Option<&str>,
    ) -> SourceResult<Page<Grant>> {
        self.page(
            &format!("list_file_members:{}", member_key(member_id, path)),
            cursor,
        )
    }

    fn download_file(&self, member_id: &str, path: &str) -> SourceResult<Download> {
        let key = format!("download_file:{}", member_key(member_id, path));
        self.record(&key)?;
        self.files.get(&key).cloned().ok_or_else(|| {
            TransportError::new(TransportErrorKind::Api { status: 409 }, format!("not found: {path}"))
        })
    }
}

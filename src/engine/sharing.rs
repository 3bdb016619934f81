//! Sharing resolution: flatten a shared folder's or file's grants into user ids and group names.

use crate::error::SharingError;
use crate::source::Source;
use crate::{Grant, SharingInfo};

use super::pages::drain_pages;

fn split(grants: Vec<Grant>) -> SharingInfo {
    let mut users = Vec::new();
    let mut groups = Vec::new();
    for grant in grants {
        match grant {
            Grant::User(id) => users.push(id),
            Grant::Group(name) => groups.push(name),
        }
    }
    SharingInfo::new(users, groups)
}

/// Members of shared folder `container_id`, in the order the source returned them. Duplicates kept.
pub fn resolve_container<S: Source + ?Sized>(
    source: &S,
    member_id: &str,
    container_id: &str,
) -> Result<SharingInfo, SharingError> {
    drain_pages(|cursor| source.list_container_members(member_id, container_id, cursor))
        .map(split)
        .map_err(|source| SharingError {
            target: format!("shared folder {container_id}"),
            source,
        })
}

/// Members of the file at `path`, same contract as [`resolve_container`].
pub fn resolve_file<S: Source + ?Sized>(
    source: &S,
    member_id: &str,
    path: &str,
) -> Result<SharingInfo, SharingError> {
    drain_pages(|cursor| source.list_file_members(member_id, path, cursor))
        .map(split)
        .map_err(|source| SharingError {
            target: format!("file {path}"),
            source,
        })
}

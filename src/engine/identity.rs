//! Identity mapping: team members to `(email, member id)` pairs and groups to email rosters.

use log::warn;
use rayon::prelude::*;
use std::collections::BTreeSet;

use crate::error::EnumerationError;
use crate::source::Source;
use crate::{Group, GroupMember, IdentityGroup, IdentityUser};

use super::directory::list_members;
use super::pages::drain_pages;

/// One identity per member that has both an id and an email. Others are skipped with a warning.
pub fn list_identity_users<S: Source + ?Sized>(
    source: &S,
) -> Result<Vec<IdentityUser>, EnumerationError> {
    let members = list_members(source)?;
    Ok(members
        .into_iter()
        .filter_map(|m| match m.email {
            Some(email) if !email.is_empty() && !m.id.is_empty() => Some(IdentityUser {
                index_identity: email,
                external_identity: m.id,
            }),
            _ => {
                warn!("Skipping invalid user: {} ({})", m.id, m.display_name);
                None
            }
        })
        .collect())
}

pub fn list_groups<S: Source + ?Sized>(source: &S) -> Result<Vec<Group>, EnumerationError> {
    drain_pages(|cursor| source.list_groups(cursor)).map_err(|source| EnumerationError {
        what: "groups",
        source,
    })
}

pub fn list_group_members<S: Source + ?Sized>(
    source: &S,
    group_id: &str,
) -> Result<Vec<GroupMember>, EnumerationError> {
    drain_pages(|cursor| source.list_group_members(group_id, cursor)).map_err(|source| {
        EnumerationError {
            what: "group members",
            source,
        }
    })
}

/// Every group with the emails of its members. Members are fetched per group in
/// parallel; output keeps the source's group order. Members without email are dropped.
pub fn list_identity_groups<S: Source + ?Sized>(
    source: &S,
) -> Result<Vec<IdentityGroup>, EnumerationError> {
    let groups = list_groups(source)?;
    groups
        .par_iter()
        .map(|group| -> Result<IdentityGroup, EnumerationError> {
            let members: BTreeSet<String> = list_group_members(source, &group.id)?
                .into_iter()
                .filter(|m| !m.member_id.is_empty())
                .filter_map(|m| m.email.filter(|e| !e.is_empty()))
                .collect();
            Ok(IdentityGroup {
                name: group.name.clone(),
                members,
            })
        })
        .collect()
}

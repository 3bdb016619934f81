//! Team enumeration: one root descriptor per retained member.

use log::{debug, warn};
use std::collections::HashSet;

use crate::error::EnumerationError;
use crate::source::Source;
use crate::{Descriptor, Enumeration, TeamMember};

use super::pages::drain_pages;
use super::state::TraversalState;

/// Every team member, all pages drained. All or nothing.
pub fn list_members<S: Source + ?Sized>(source: &S) -> Result<Vec<TeamMember>, EnumerationError> {
    drain_pages(|cursor| source.list_team_members(cursor)).map_err(|source| EnumerationError {
        what: "team members",
        source,
    })
}

/// Root descriptors for members in `allow_list` (every member when it is empty).
/// The key is the member's display name; the payload is a member-root state. Members whose
/// display name is already taken by an earlier member are skipped, since their keys would collide.
pub fn list_principals<S: Source + ?Sized>(
    source: &S,
    allow_list: &HashSet<String>,
) -> Result<Enumeration, EnumerationError> {
    let members = list_members(source)?;
    let mut out = Enumeration::default();
    let mut names: HashSet<String> = HashSet::new();
    for member in members {
        if !allow_list.is_empty() && !allow_list.contains(&member.id) {
            debug!("Member {} not in allow-list; skipping", member.id);
            out.skipped += 1;
            continue;
        }
        if !member.is_usable() {
            warn!("Skipping member with empty id or display name: {:?}", member);
            out.skipped += 1;
            continue;
        }
        if !names.insert(member.display_name.clone()) {
            warn!(
                "Skipping member {}: display name {:?} already used by another member",
                member.id, member.display_name
            );
            out.skipped += 1;
            continue;
        }
        let state = TraversalState::member_root(&member.id, &member.display_name);
        out.roots.push(Descriptor {
            key: member.display_name.clone(),
            payload: state.encode(),
        });
        out.retained += 1;
    }
    debug!(
        "Enumerated {} members ({} skipped)",
        out.retained, out.skipped
    );
    Ok(out)
}

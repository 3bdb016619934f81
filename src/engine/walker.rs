//! One-level tree walk: list a container's immediate children as descriptors.

use log::trace;

use crate::error::TraversalError;
use crate::source::Source;
use crate::Descriptor;

use super::pages::drain_pages;
use super::path::join;
use super::state::TraversalState;

/// Children of `parent` at `path`, in source order. Entries that are neither folders
/// nor files are skipped. Keys are `<member display name>/<child path>`.
pub fn list_children<S: Source + ?Sized>(
    source: &S,
    parent: &TraversalState,
    path: &str,
) -> Result<Vec<Descriptor>, TraversalError> {
    let entries = drain_pages(|cursor| source.list_folder(&parent.member_id, path, cursor))
        .map_err(|source| TraversalError {
            member_id: parent.member_id.clone(),
            path: path.to_string(),
            source,
        })?;

    let children = entries
        .iter()
        .filter_map(|entry| match TraversalState::from_entry(parent, entry) {
            Some(state) => Some(Descriptor {
                key: join(&[parent.member_name.as_str(), state.path.as_str()]),
                payload: state.encode(),
            }),
            None => {
                trace!("Skipping {:?} entry {}", entry.kind, entry.path);
                None
            }
        })
        .collect();
    Ok(children)
}

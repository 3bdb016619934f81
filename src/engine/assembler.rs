//! Document assembly: turn one host-supplied traversal state into a document,
//! its immediate children, or a delete instruction.

use log::debug;
use std::collections::HashSet;

use crate::error::{AssemblyCause, AssemblyError};
use crate::source::Source;
use crate::{
    AclPolicy, ContainerDocument, Content, ContentDocument, DeleteReason, Descriptor, Document,
    Reader, SharingInfo,
};

use super::sharing::{resolve_container, resolve_file};
use super::state::{NodeKind, TraversalState};
use super::walker::list_children;

/// Stateless between calls: safe to share across worker threads.
pub struct Assembler<'a, S: Source + ?Sized> {
    source: &'a S,
    policy: AclPolicy,
    max_content_bytes: u64,
}

fn readers_from(info: &SharingInfo) -> Vec<Reader> {
    info.user_ids()
        .iter()
        .cloned()
        .map(Reader::User)
        .chain(info.group_names().iter().cloned().map(Reader::Group))
        .collect()
}

/// Drop repeated readers, keeping the first occurrence.
pub fn dedupe_readers(readers: Vec<Reader>) -> Vec<Reader> {
    let mut seen = HashSet::new();
    readers
        .into_iter()
        .filter(|r| seen.insert(r.clone()))
        .collect()
}

impl<'a, S: Source + ?Sized> Assembler<'a, S> {
    pub fn new(source: &'a S, policy: AclPolicy, max_content_bytes: u64) -> Self {
        Self {
            source,
            policy,
            max_content_bytes,
        }
    }

    fn apply_policy(&self, readers: Vec<Reader>) -> Vec<Reader> {
        if self.policy.dedupe {
            dedupe_readers(readers)
        } else {
            readers
        }
    }

    /// Materialize the node encoded in `payload`. Undecodable or invalid payloads
    /// become [`Document::Delete`] without touching the source.
    pub fn assemble(&self, payload: &[u8]) -> Result<Document, AssemblyError> {
        let state = match TraversalState::decode(payload) {
            Ok(state) => state,
            Err(e) => {
                debug!("{}; deleting", e);
                return Ok(Document::Delete(DeleteReason::Undecodable));
            }
        };
        if !state.is_valid() {
            debug!("Invalid state {}; deleting", state.label());
            return Ok(Document::Delete(DeleteReason::Invalid));
        }
        self.assemble_state(&state)
            .map_err(|cause| AssemblyError {
                node: state.label(),
                cause,
            })
    }

    fn assemble_state(&self, state: &TraversalState) -> Result<Document, AssemblyCause> {
        match state.kind {
            NodeKind::Member => {
                let acl = vec![Reader::User(state.member_id.clone())];
                self.container(state, acl)
            }
            NodeKind::Folder => {
                let acl = match state.shared_folder_id.as_deref() {
                    None => vec![Reader::User(state.member_id.clone())],
                    Some(sf) => readers_from(&resolve_container(self.source, &state.member_id, sf)?),
                };
                self.container(state, acl)
            }
            NodeKind::File => self.content(state),
            // Rejected by is_valid before reaching here.
            NodeKind::Unsupported => Ok(Document::Delete(DeleteReason::Invalid)),
        }
    }

    fn container(
        &self,
        state: &TraversalState,
        acl: Vec<Reader>,
    ) -> Result<Document, AssemblyCause> {
        let children: Vec<Descriptor> = list_children(self.source, state, state.source_path())?;
        debug!("{}: {} children", state.label(), children.len());
        Ok(Document::Container(ContainerDocument {
            kind: state.kind,
            title: state.title().to_string(),
            acl: self.apply_policy(acl),
            state: state.encode(),
            children,
        }))
    }

    fn content(&self, state: &TraversalState) -> Result<Document, AssemblyCause> {
        // is_valid guarantees a server-modified time for files.
        let Some(modified) = state.server_modified else {
            return Ok(Document::Delete(DeleteReason::Invalid));
        };
        let info = resolve_file(self.source, &state.member_id, &state.path)?;
        let content = if !state.downloadable {
            None
        } else if state.size > self.max_content_bytes {
            debug!(
                "{}: {} bytes over content limit {}; indexing without content",
                state.label(),
                state.size,
                self.max_content_bytes
            );
            None
        } else {
            let download = self
                .source
                .download_file(&state.member_id, &state.path)
                .map_err(AssemblyCause::Download)?;
            Some(Content {
                content_type: download.content_type,
                bytes: download.bytes,
            })
        };
        Ok(Document::Content(ContentDocument {
            title: state.title().to_string(),
            acl: self.apply_policy(readers_from(&info)),
            state: state.encode(),
            modified,
            size: state.size,
            content,
        }))
    }
}

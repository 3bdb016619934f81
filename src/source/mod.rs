//! Source API capabilities the engine needs, one method per call.
//!
//! Paginated calls take `cursor: None` for the first page and the previous page's
//! cursor afterwards. Calls made on behalf of a member take the acting member id.

pub mod dropbox;
pub mod memory;

use crate::error::SourceResult;
use crate::{Download, FolderEntry, Grant, Group, GroupMember, Page, TeamMember};

pub use dropbox::{DropboxClient, api_arg_header};
pub use memory::MemorySource;

pub trait Source: Send + Sync {
    fn list_team_members(&self, cursor: Option<&str>) -> SourceResult<Page<TeamMember>>;

    fn list_groups(&self, cursor: Option<&str>) -> SourceResult<Page<Group>>;

    fn list_group_members(
        &self,
        group_id: &str,
        cursor: Option<&str>,
    ) -> SourceResult<Page<GroupMember>>;

    /// Immediate children of `path` (empty path = member root).
    fn list_folder(
        &self,
        member_id: &str,
        path: &str,
        cursor: Option<&str>,
    ) -> SourceResult<Page<FolderEntry>>;

    fn list_container_members(
        &self,
        member_id: &str,
        container_id: &str,
        cursor: Option<&str>,
    ) -> SourceResult<Page<Grant>>;

    fn list_file_members(
        &self,
        member_id: &str,
        path: &str,
        cursor: Option<&str>,
    ) -> SourceResult<Page<Grant>>;

    fn download_file(&self, member_id: &str, path: &str) -> SourceResult<Download>;
}

//! Dropbox v2 HTTP API implementation of [`Source`].

use chrono::{DateTime, Utc};
use log::{debug, info};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

use crate::error::{SourceResult, TransportError, TransportErrorKind};
use crate::utils::config::{API_PAGE_LIMIT as PAGE_LIMIT, HTTP_TIMEOUT_SECS};
use crate::utils::credentials::Credentials;
use crate::{Download, EntryKind, FolderEntry, Grant, Group, GroupMember, Page, TeamMember};

use super::Source;

const API_BASE: &str = "https://api.dropboxapi.com/2";
const CONTENT_BASE: &str = "https://content.dropboxapi.com/2";
const OAUTH_TOKEN_URL: &str = "https://api.dropbox.com/oauth2/token";
const SELECT_USER_HEADER: &str = "Dropbox-API-Select-User";
const API_ARG_HEADER: &str = "Dropbox-API-Arg";
const FILE_MEMBERS_LIMIT: u32 = 300;
const OCTET_STREAM: &str = "application/octet-stream";

// ---- Wire shapes ----

#[derive(Deserialize)]
struct MemberName {
    #[serde(default)]
    display_name: String,
}

#[derive(Deserialize)]
struct MemberProfile {
    #[serde(default)]
    team_member_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<MemberName>,
}

#[derive(Deserialize)]
struct MemberInfo {
    profile: MemberProfile,
}

#[derive(Deserialize)]
struct MembersList {
    #[serde(default)]
    members: Vec<MemberInfo>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Deserialize)]
struct GroupSummary {
    group_id: String,
    group_name: String,
}

#[derive(Deserialize)]
struct GroupsList {
    #[serde(default)]
    groups: Vec<GroupSummary>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Deserialize, Default)]
struct SharingMeta {
    #[serde(default)]
    parent_shared_folder_id: Option<String>,
    #[serde(default)]
    shared_folder_id: Option<String>,
}

#[derive(Deserialize)]
struct Metadata {
    #[serde(rename = ".tag")]
    tag: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    path_display: Option<String>,
    #[serde(default)]
    shared_folder_id: Option<String>,
    #[serde(default)]
    sharing_info: Option<SharingMeta>,
    #[serde(default)]
    is_downloadable: Option<bool>,
    #[serde(default)]
    server_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    client_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    rev: Option<String>,
    #[serde(default)]
    content_hash: Option<String>,
    #[serde(default)]
    size: u64,
}

#[derive(Deserialize)]
struct ListFolder {
    #[serde(default)]
    entries: Vec<Metadata>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Deserialize)]
struct SharedUser {
    #[serde(default)]
    team_member_id: Option<String>,
}

#[derive(Deserialize)]
struct UserMembership {
    user: SharedUser,
}

#[derive(Deserialize)]
struct SharedGroup {
    group_name: String,
}

#[derive(Deserialize)]
struct GroupMembership {
    group: SharedGroup,
}

#[derive(Deserialize)]
struct SharedMembers {
    #[serde(default)]
    users: Vec<UserMembership>,
    #[serde(default)]
    groups: Vec<GroupMembership>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// JSON for the `Dropbox-API-Arg` header. HTTP headers must be ASCII, so every char above
/// 0x7F is written as `\uXXXX` (UTF-16, surrogate pairs outside the BMP).
pub fn api_arg_header(arg: &Value) -> String {
    let raw = arg.to_string();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() {
            out.push(c);
            continue;
        }
        let mut units = [0u16; 2];
        for unit in c.encode_utf16(&mut units) {
            out.push_str(&format!("\\u{:04x}", unit));
        }
    }
    out
}

fn next_cursor(has_more: bool, cursor: Option<String>) -> Option<String> {
    cursor.filter(|c| has_more && !c.is_empty())
}

impl From<Metadata> for FolderEntry {
    fn from(m: Metadata) -> Self {
        let kind = match m.tag.as_str() {
            "folder" => EntryKind::Folder,
            "file" => EntryKind::File,
            _ => EntryKind::Other,
        };
        let sharing = m.sharing_info.unwrap_or_default();
        FolderEntry {
            kind,
            id: m.id,
            path: m.path_display.unwrap_or_default(),
            name: m.name,
            shared_folder_id: m.shared_folder_id.or(sharing.shared_folder_id),
            parent_shared_folder_id: sharing.parent_shared_folder_id,
            downloadable: m.is_downloadable.unwrap_or(kind == EntryKind::File),
            server_modified: m.server_modified,
            client_modified: m.client_modified,
            rev: m.rev,
            content_hash: m.content_hash,
            size: m.size,
        }
    }
}

impl From<SharedMembers> for Page<Grant> {
    fn from(s: SharedMembers) -> Self {
        let users = s
            .users
            .into_iter()
            .filter_map(|u| u.user.team_member_id)
            .map(Grant::User);
        let groups = s.groups.into_iter().map(|g| Grant::Group(g.group.group_name));
        Page {
            items: users.chain(groups).collect(),
            cursor: s.cursor.filter(|c| !c.is_empty()),
        }
    }
}

// ---- Client ----

/// Blocking Dropbox team client.
pub struct DropboxClient {
    http: Client,
    token: String,
    api_base: String,
    content_base: String,
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    TransportError::network(format!("request failed: {e}"))
}

/// Turn a non-success response into a classified error.
fn status_error(resp: Response) -> TransportError {
    let status = resp.status();
    let retry_after = resp
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = resp.text().unwrap_or_default();
    let kind = match status {
        StatusCode::TOO_MANY_REQUESTS => TransportErrorKind::RateLimited { retry_after },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportErrorKind::Auth,
        _ => TransportErrorKind::Api {
            status: status.as_u16(),
        },
    };
    TransportError::new(kind, format!("HTTP {status}: {body}"))
}

impl DropboxClient {
    /// Build a client from loaded credentials, refreshing the access token first when needed.
    pub fn new(credentials: &Credentials) -> SourceResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::network(format!("http client: {e}")))?;
        let token = match credentials.usable_access_token() {
            Some(token) => token.to_string(),
            None => refresh_access_token(&http, credentials)?,
        };
        Ok(Self {
            http,
            token,
            api_base: API_BASE.to_string(),
            content_base: CONTENT_BASE.to_string(),
        })
    }

    /// Point the client at other endpoints (e.g. a local mock server).
    pub fn with_base_urls(mut self, api_base: &str, content_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.content_base = content_base.trim_end_matches('/').to_string();
        self
    }

    fn rpc(&self, endpoint: &str, member_id: Option<&str>, body: Value) -> RequestBuilder {
        let mut req = self
            .http
            .post(format!("{}/{}", self.api_base, endpoint))
            .bearer_auth(&self.token)
            .json(&body);
        if let Some(id) = member_id {
            req = req.header(SELECT_USER_HEADER, id);
        }
        req
    }

    fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        member_id: Option<&str>,
        body: Value,
    ) -> SourceResult<T> {
        debug!("POST {}", endpoint);
        let resp = self
            .rpc(endpoint, member_id, body)
            .send()
            .map_err(map_send_error)?;
        if !resp.status().is_success() {
            return Err(status_error(resp));
        }
        resp.json::<T>().map_err(|e| {
            TransportError::new(
                TransportErrorKind::Protocol,
                format!("{endpoint}: unexpected response: {e}"),
            )
        })
    }

    /// First page from `first`, continuation pages from `cont` with `{"cursor": ...}`.
    fn paged<T: DeserializeOwned>(
        &self,
        first: (&str, Value),
        cont: &str,
        member_id: Option<&str>,
        cursor: Option<&str>,
    ) -> SourceResult<T> {
        match cursor {
            None => self.call(first.0, member_id, first.1),
            Some(c) => self.call(cont, member_id, json!({ "cursor": c })),
        }
    }
}

fn refresh_access_token(http: &Client, credentials: &Credentials) -> SourceResult<String> {
    let (Some(refresh), Some(app_key)) = (&credentials.refresh_token, &credentials.app_key) else {
        return Err(TransportError::new(
            TransportErrorKind::Auth,
            "access token expired and no refresh token/app key to renew it",
        ));
    };
    info!("Refreshing Dropbox access token");
    let mut form = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh.as_str()),
        ("client_id", app_key.as_str()),
    ];
    if let Some(secret) = &credentials.app_secret {
        form.push(("client_secret", secret.as_str()));
    }
    let resp = http
        .post(OAUTH_TOKEN_URL)
        .form(&form)
        .send()
        .map_err(map_send_error)?;
    if !resp.status().is_success() {
        return Err(status_error(resp));
    }
    resp.json::<TokenResponse>()
        .map(|t| t.access_token)
        .map_err(|e| TransportError::new(TransportErrorKind::Protocol, format!("token: {e}")))
}

impl Source for DropboxClient {
    fn list_team_members(&self, cursor: Option<&str>) -> SourceResult<Page<TeamMember>> {
        let list: MembersList = self.paged(
            ("team/members/list_v2", json!({ "limit": PAGE_LIMIT })),
            "team/members/list/continue_v2",
            None,
            cursor,
        )?;
        let items = list
            .members
            .into_iter()
            .map(|m| TeamMember {
                id: m.profile.team_member_id,
                display_name: m.profile.name.map(|n| n.display_name).unwrap_or_default(),
                email: m.profile.email.filter(|e| !e.is_empty()),
            })
            .collect();
        Ok(Page {
            items,
            cursor: next_cursor(list.has_more, list.cursor),
        })
    }

    fn list_groups(&self, cursor: Option<&str>) -> SourceResult<Page<Group>> {
        let list: GroupsList = self.paged(
            ("team/groups/list", json!({ "limit": PAGE_LIMIT })),
            "team/groups/list/continue",
            None,
            cursor,
        )?;
        let items = list
            .groups
            .into_iter()
            .map(|g| Group {
                id: g.group_id,
                name: g.group_name,
            })
            .collect();
        Ok(Page {
            items,
            cursor: next_cursor(list.has_more, list.cursor),
        })
    }

    fn list_group_members(
        &self,
        group_id: &str,
        cursor: Option<&str>,
    ) -> SourceResult<Page<GroupMember>> {
        let body = json!({
            "group": { ".tag": "group_id", "group_id": group_id },
            "limit": PAGE_LIMIT,
        });
        let list: MembersList = self.paged(
            ("team/groups/members/list", body),
            "team/groups/members/list/continue",
            None,
            cursor,
        )?;
        let items = list
            .members
            .into_iter()
            .map(|m| GroupMember {
                member_id: m.profile.team_member_id,
                email: m.profile.email.filter(|e| !e.is_empty()),
            })
            .collect();
        Ok(Page {
            items,
            cursor: next_cursor(list.has_more, list.cursor),
        })
    }

    fn list_folder(
        &self,
        member_id: &str,
        path: &str,
        cursor: Option<&str>,
    ) -> SourceResult<Page<FolderEntry>> {
        let body = json!({ "path": path, "recursive": false, "limit": PAGE_LIMIT });
        let list: ListFolder = self.paged(
            ("files/list_folder", body),
            "files/list_folder/continue",
            Some(member_id),
            cursor,
        )?;
        Ok(Page {
            items: list.entries.into_iter().map(FolderEntry::from).collect(),
            cursor: next_cursor(list.has_more, list.cursor),
        })
    }

    fn list_container_members(
        &self,
        member_id: &str,
        container_id: &str,
        cursor: Option<&str>,
    ) -> SourceResult<Page<Grant>> {
        let body = json!({ "shared_folder_id": container_id, "limit": PAGE_LIMIT });
        let members: SharedMembers = self.paged(
            ("sharing/list_folder_members", body),
            "sharing/list_folder_members/continue",
            Some(member_id),
            cursor,
        )?;
        Ok(members.into())
    }

    fn list_file_members(
        &self,
        member_id: &str,
        path: &str,
        cursor: Option<&str>,
    ) -> SourceResult<Page<Grant>> {
        let body = json!({ "file": path, "limit": FILE_MEMBERS_LIMIT });
        let members: SharedMembers = self.paged(
            ("sharing/list_file_members", body),
            "sharing/list_file_members/continue",
            Some(member_id),
            cursor,
        )?;
        Ok(members.into())
    }

    fn download_file(&self, member_id: &str, path: &str) -> SourceResult<Download> {
        let arg = api_arg_header(&json!({ "path": path }));
        let resp = self
            .http
            .post(format!("{}/files/download", self.content_base))
            .bearer_auth(&self.token)
            .header(SELECT_USER_HEADER, member_id)
            .header(API_ARG_HEADER, arg)
            .send()
            .map_err(map_send_error)?;
        if !resp.status().is_success() {
            return Err(status_error(resp));
        }
        let reported = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_string())
            .filter(|s| !s.is_empty() && s != OCTET_STREAM);
        let content_type = reported.unwrap_or_else(|| {
            mime_guess::from_path(path)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });
        let bytes = resp
            .bytes()
            .map_err(|e| TransportError::network(format!("read body: {e}")))?;
        Ok(Download {
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}

//! Credential loading: JSON credential file, then env (DROPDEX_ACCESS_TOKEN) → .env in the config dir.

use chrono::Utc;
use log::{debug, info};
use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;

use super::config::ENV_ACCESS_TOKEN;

/// Tokens expiring within this window are treated as expired (ms).
const EXPIRY_SLACK_MS: i64 = 60_000;

/// Contents of the credential file. Only the fields needed to obtain a bearer token.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry of `access_token`, epoch milliseconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub app_key: Option<String>,
    #[serde(default)]
    pub app_secret: Option<String>,
}

impl Credentials {
    /// The access token, unless it is missing or about to expire.
    pub fn usable_access_token(&self) -> Option<&str> {
        let token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        match self.expires_at {
            Some(at) if at <= Utc::now().timestamp_millis() + EXPIRY_SLACK_MS => None,
            _ => Some(token),
        }
    }
}

fn env_token() -> Option<String> {
    std::env::var(ENV_ACCESS_TOKEN)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn try_env_then_dotenv(dir: &Path) -> Option<String> {
    if let Some(s) = env_token() {
        return Some(s);
    }
    let env_path = dir.join(".env");
    if env_path.is_file() {
        let _ = dotenvy::from_path(&env_path);
        return env_token();
    }
    None
}

/// Read the credential file at `path` (already resolved, see
/// [`Settings::credential_path`](super::Settings::credential_path)), then let the environment
/// override the access token; `dir` is where `.env` is looked up. Fails when no way to get a
/// token remains.
pub fn load_credentials(path: &Path, dir: &Path) -> Result<Credentials, ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::MissingCredentialFile);
    }
    let display = path.display().to_string();
    let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: display.clone(),
        reason: e.to_string(),
    })?;
    let mut credentials: Credentials =
        serde_json::from_str(&s).map_err(|e| ConfigError::Invalid {
            path: display.clone(),
            reason: e.to_string(),
        })?;
    debug!("Loaded credentials from {}", display);

    if let Some(token) = try_env_then_dotenv(dir) {
        info!("Access token found in environment");
        credentials.access_token = Some(token);
        credentials.expires_at = None;
    }
    let refreshable = credentials.refresh_token.is_some() && credentials.app_key.is_some();
    if credentials.usable_access_token().is_none() && !refreshable {
        return Err(ConfigError::NoAccessToken);
    }
    Ok(credentials)
}

/// Credentials from DROPDEX_ACCESS_TOKEN alone (env, then `.env` in `dir`), for setups without a credential file.
pub fn credentials_from_env(dir: &Path) -> Option<Credentials> {
    try_env_then_dotenv(dir).map(|token| Credentials {
        access_token: Some(token),
        ..Credentials::default()
    })
}

//! Load `dropdex.toml`: the `[dropbox]` connection section and `[settings]` tuning applied onto [`Opts`].

use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::Opts;
use crate::error::ConfigError;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DropdexToml {
    #[serde(default)]
    dropbox: DropboxSection,
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DropboxSection {
    credential_file: Option<String>,
    team_member_ids: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsSection {
    db_path: Option<String>,
    workers: Option<usize>,
    batch_size: Option<usize>,
    max_attempts: Option<u32>,
    max_resumes: Option<u32>,
    max_content_bytes: Option<u64>,
    dedupe_acl: Option<bool>,
    verbose: Option<bool>,
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($idx:expr, $opts:expr, $idx_field:ident => $opts_field:ident) => {
        if let Some(v) = $idx.$idx_field {
            $opts.$opts_field = v;
        }
    };
}

/// Parsed configuration. `opts` holds defaults overlaid with the file; CLI flags go on top.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Directory of the config file; relative paths and `.env` resolve here.
    pub dir: PathBuf,
    credential_file: Option<String>,
    pub opts: Opts,
}

impl Settings {
    /// Read and parse `path`. Missing or malformed files are errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: display.clone(),
            reason: e.to_string(),
        })?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let settings = Self::from_toml_str(&s, &dir).map_err(|reason| ConfigError::Invalid {
            path: display.clone(),
            reason,
        })?;
        debug!("Loaded config from {}", display);
        Ok(settings)
    }

    /// Like [`load`](Self::load), but a missing file yields defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load(path);
        }
        debug!("{} not found; using defaults", path.display());
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            dir,
            credential_file: None,
            opts: Opts::default(),
        })
    }

    /// Parse TOML text; `dir` is where the file lives.
    pub fn from_toml_str(s: &str, dir: &Path) -> Result<Self, String> {
        let file: DropdexToml = toml::from_str(s).map_err(|e| e.to_string())?;
        let mut opts = Opts::default();
        apply_file_to_opts(&file, dir, &mut opts);
        Ok(Self {
            dir: dir.to_path_buf(),
            credential_file: file.dropbox.credential_file,
            opts,
        })
    }

    /// Credential file path, resolved against the config dir. Required for live runs.
    pub fn credential_path(&self) -> Result<PathBuf, ConfigError> {
        match self.credential_file.as_deref().map(str::trim) {
            None | Some("") => Err(ConfigError::MissingCredentialFile),
            Some(p) => Ok(self.dir.join(p)),
        }
    }
}

/// Apply file config to opts (only set fields present in the file). Call before applying CLI.
fn apply_file_to_opts(file: &DropdexToml, dir: &Path, opts: &mut Opts) {
    if let Some(ref ids) = file.dropbox.team_member_ids {
        opts.allow_list = ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
    }
    let idx = &file.settings;
    if let Some(ref p) = idx.db_path {
        opts.db_path = Some(dir.join(p));
    }
    apply_file_opt!(idx, opts, workers => workers);
    apply_file_opt!(idx, opts, batch_size => batch_size);
    apply_file_opt!(idx, opts, max_attempts => max_attempts);
    apply_file_opt!(idx, opts, max_resumes => max_resumes);
    apply_file_opt!(idx, opts, max_content_bytes => max_content_bytes);
    apply_file_opt!(idx, opts, verbose => verbose);
    if let Some(dedupe) = idx.dedupe_acl {
        opts.acl_policy.dedupe = dedupe;
    }
}

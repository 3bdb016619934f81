//! Application configuration constants.
//! Tuning and defaults in one place.

use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived file names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    db_filename: String,
    config_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                db_filename: format!(".{pkg}"),
                config_filename: format!("{pkg}.toml"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Index database file name, placed next to the config file by default.
    pub fn db_filename(&self) -> &str {
        &self.db_filename
    }

    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }
}

// ---- Environment ----

/// Access token override; also read from `.env` next to the config file.
pub const ENV_ACCESS_TOKEN: &str = "DROPDEX_ACCESS_TOKEN";

// ---- Sync tuning ----

/// Worker threads assembling documents.
pub const DEFAULT_WORKERS: usize = 4;

/// Queue entries dispatched per round.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Failures before a queued item is left for the next run.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Runs that may pick up one open generation before a fresh one is started instead.
pub const DEFAULT_MAX_RESUMES: u32 = 3;

/// Files declared larger than this are indexed without content (bytes). 10 MB.
pub const DEFAULT_MAX_CONTENT_BYTES: u64 = 10 * 1024 * 1024;

/// Poll interval for the result channel so Ctrl+C is noticed promptly (ms).
pub const CANCEL_POLL_MS: u64 = 200;

// ---- Source API ----

/// Page size requested from list endpoints.
pub const API_PAGE_LIMIT: u32 = 1000;

/// HTTP timeout for API and content calls (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 60;

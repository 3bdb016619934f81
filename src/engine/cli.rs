//! CLI command handler: content sync by default; --identity and --item select the other runs.

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::arg_parser::Cli;
use crate::engine::db_ops::open_db;
use crate::pipeline::{refetch_item, run_content_sync, run_identity_sync};
use crate::source::{DropboxClient, MemorySource, Source};
use crate::utils::config::PackagePaths;
use crate::utils::{Colors, Settings, credentials_from_env, load_credentials, setup_logging};
use crate::{Opts, SyncStats};

/// Load the config file (optional with --fixture) and lay CLI flags over it.
fn setup_opts(cli: &Cli) -> Result<(Settings, Opts)> {
    let config = cli.config_path();
    let settings = if cli.fixture.is_some() {
        Settings::load_or_default(&config)?
    } else {
        Settings::load(&config)?
    };
    let mut opts = settings.opts.clone();
    if let Some(ref db) = cli.db {
        opts.db_path = Some(db.clone());
    }
    if let Some(workers) = cli.workers {
        opts.workers = workers;
    }
    if let Some(verbose) = cli.verbose {
        opts.verbose = verbose;
    }
    opts.restart = cli.restart;
    setup_logging(opts.verbose);
    Ok((settings, opts))
}

fn open_source(cli: &Cli, settings: &Settings) -> Result<Arc<dyn Source>> {
    if let Some(ref fixture) = cli.fixture {
        info!("Using fixture {}", fixture.display());
        return Ok(Arc::new(MemorySource::from_fixture_file(fixture)?));
    }
    let credentials = match settings.credential_path() {
        Ok(path) => load_credentials(&path, &settings.dir)?,
        Err(e) => credentials_from_env(&settings.dir).ok_or(e)?,
    };
    let client = DropboxClient::new(&credentials).context("connect to Dropbox")?;
    Ok(Arc::new(client))
}

fn db_path(settings: &Settings, opts: &Opts) -> PathBuf {
    opts.db_path
        .clone()
        .unwrap_or_else(|| settings.dir.join(PackagePaths::get().db_filename()))
}

/// Print sync summary
fn print_summary(stats: &SyncStats) {
    info!(
        "{} | {} | {} | unchanged: {}",
        Colors::colorize(Colors::ADDED, &format!("Added: {}", stats.added)),
        Colors::colorize(Colors::MODIFIED, &format!("Modified: {}", stats.modified)),
        Colors::colorize(
            Colors::DELETED,
            &format!("Deleted: {}", stats.deleted + stats.swept)
        ),
        stats.unchanged
    );
    if stats.skipped > 0 {
        info!(
            "{}",
            Colors::colorize(
                Colors::FAILED,
                &format!("Skipped: {} (not retryable)", stats.skipped)
            )
        );
    }
    if stats.failed > 0 || stats.remaining > 0 {
        info!(
            "{}",
            Colors::colorize(
                Colors::FAILED,
                &format!(
                    "Failures: {} ({} items left for the next run)",
                    stats.failed, stats.remaining
                )
            )
        );
    }
}

/// Run content sync (default), identity sync (--identity) or a single-item refetch (--item).
pub fn handle_run(cli: &Cli) -> Result<()> {
    let (settings, opts) = setup_opts(cli)?;
    debug!(
        "{} CONFIG:{:#?}",
        PackagePaths::get().pkg_name().to_uppercase(),
        opts
    );
    let source = open_source(cli, &settings)?;
    let mut conn = open_db(&db_path(&settings, &opts))?;

    if cli.identity {
        run_identity_sync(source.as_ref(), &mut conn)?;
        return Ok(());
    }
    if let Some(ref key) = cli.item {
        refetch_item(source.as_ref(), &conn, key, &opts)?;
        return Ok(());
    }

    let cancel_requested = Arc::new(AtomicBool::new(false));
    let cancel_requested_handler = Arc::clone(&cancel_requested);
    ctrlc::set_handler(move || {
        cancel_requested_handler.store(true, Ordering::Relaxed);
    })
    .context("set Ctrl+C handler")?;

    let stats = run_content_sync(source, &mut conn, &opts, Some(cancel_requested))?;
    print_summary(&stats);
    Ok(())
}

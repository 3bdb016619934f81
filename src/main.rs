//! Dropdex CLI: sync a Dropbox team into a local index.

use anyhow::Result;
use clap::Parser;
use dropdex::engine::arg_parser::Cli;
use dropdex::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}

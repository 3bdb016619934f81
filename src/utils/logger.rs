use colored::{ColoredString, Colorize};
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

fn level_tag(level: Level) -> Option<ColoredString> {
    match level {
        Level::Error => Some("ERROR".red()),
        Level::Warn => Some("WARN".yellow()),
        _ => None,
    }
}

/// Init env_logger once: dropdex at info (debug when verbose), dependencies at warn.
/// Later calls are no-ops.
pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = Builder::from_default_env()
        .filter_level(LevelFilter::Warn) // Default: only warnings from dependencies
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME").cyan();
            match level_tag(record.level()) {
                Some(tag) => writeln!(
                    buf,
                    "[{} {} {}] {}",
                    name,
                    tag,
                    record.target().white(),
                    record.args()
                ),
                None => writeln!(buf, "[{}] {}", name, record.args()),
            }
        })
        .try_init();
}

/// Colors for the sync summary line.
pub struct Colors;

impl Colors {
    pub const ADDED: colored::Color = colored::Color::Green;
    pub const MODIFIED: colored::Color = colored::Color::Yellow;
    pub const DELETED: colored::Color = colored::Color::Red;
    pub const FAILED: colored::Color = colored::Color::Magenta;

    pub fn colorize(color: colored::Color, text: &str) -> String {
        text.color(color).to_string()
    }
}

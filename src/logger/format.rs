//! Log formatting and console output with ANSI colors
//!
//! Produces aligned `time [TAG] [LEVEL] message` lines. Broken pipes are
//! treated as a clean shutdown so piping into `head` works.

use super::tags::LogTag;
use chrono::Local;
use colored::*;
use std::io::{stdout, ErrorKind, Write};

/// Column widths for alignment
const TAG_WIDTH: usize = 9;
const LEVEL_WIDTH: usize = 8;

/// Format and output a log message
pub fn format_and_log(tag: LogTag, level: &str, message: &str) {
    let time = Local::now().format("%H:%M:%S").to_string();

    let line = format!(
        "{} [{}] [{}] {}",
        time.dimmed(),
        format_tag(&tag),
        format_level(level),
        message
    );
    print_stdout_safe(&line);
}

/// Format a tag with its subsystem color
fn format_tag(tag: &LogTag) -> ColoredString {
    let padded = format!("{:<width$}", tag.to_plain_string(), width = TAG_WIDTH);
    match tag {
        LogTag::System => padded.bright_yellow().bold(),
        LogTag::Config => padded.bright_white().bold(),
        LogTag::Realtime => padded.bright_cyan().bold(),
        LogTag::Channels => padded.bright_blue().bold(),
        LogTag::Poller => padded.bright_green().bold(),
        LogTag::Direct => padded.bright_magenta().bold(),
        LogTag::Api => padded.bright_purple().bold(),
        LogTag::Test => padded.bright_blue().bold(),
        LogTag::Other(_) => padded.white().bold(),
    }
}

/// Format a level with appropriate color
fn format_level(level: &str) -> ColoredString {
    let padded = format!("{:<width$}", level, width = LEVEL_WIDTH);
    match level {
        "ERROR" => padded.bright_red().bold(),
        "WARNING" => padded.bright_yellow().bold(),
        "DEBUG" | "VERBOSE" => padded.dimmed(),
        _ => padded.white().bold(),
    }
}

/// Print to stdout but treat broken pipes as process exit
fn print_stdout_safe(message: &str) {
    if let Err(e) = writeln!(stdout(), "{}", message) {
        if e.kind() == ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        let _ = writeln!(std::io::stderr(), "Logger stdout error: {}", e);
    }
    if let Err(e) = stdout().flush() {
        if e.kind() == ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
    }
}

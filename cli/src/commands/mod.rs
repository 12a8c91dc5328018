pub mod deserialize;
pub mod ls;
pub mod serialize;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use kser_core::ArchiveEvent;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Directory that holds `path`, with `.` standing in for a bare file name.
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

pub fn spinner(visible: bool, message: &'static str) -> Result<ProgressBar> {
    if !visible {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Observer that mirrors archive events into the log and the spinner.
pub fn report(pb: &ProgressBar) -> impl FnMut(&ArchiveEvent) + '_ {
    move |event| {
        debug!("{}", event);
        pb.set_message(event.to_string());
    }
}

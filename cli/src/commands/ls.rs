use crate::config::Settings;
use anyhow::{Context, Result};
use clap::Args;
use kser_core::{Archiver, Entry};
use std::path::PathBuf;

#[derive(Args)]
pub struct LsCommand {
    #[arg(help = "Archive to list")]
    archive: PathBuf,

    #[arg(long, help = "Print entries as JSON")]
    json: bool,
}

impl LsCommand {
    pub fn run(&self, settings: &Settings) -> Result<()> {
        let header = Archiver::new()
            .with_path_encoding(settings.path_encoding)
            .read_header(&self.archive)
            .with_context(|| format!("Failed to read {}", self.archive.display()))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&header.entries)?);
            return Ok(());
        }

        for entry in &header.entries {
            println!("{}", format_entry(entry));
        }
        println!(
            "{} entries, {} bytes of file data starting at offset {}",
            header.entries.len(),
            header.payload_len(),
            header.payload_offset
        );
        Ok(())
    }
}

fn format_entry(entry: &Entry) -> String {
    format!(
        "{} {:#010x} {:>#7o} {:>12} {}",
        if entry.is_directory { 'd' } else { '-' },
        entry.windows_rights,
        entry.posix_mode,
        entry.size,
        entry.relative_path
    )
}

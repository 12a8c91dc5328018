use super::{confirm, parent_dir, report, spinner};
use crate::config::Settings;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use kser_core::snapshot::root_name;
use kser_core::Archiver;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args)]
pub struct SerializeCommand {
    #[arg(help = "File or directory to archive")]
    input: PathBuf,

    #[arg(help = "Archive file to create or refresh, or a directory to place a new archive in \
                  (defaults to the input's parent directory)")]
    output: Option<PathBuf>,
}

impl SerializeCommand {
    pub fn run(&self, settings: &Settings) -> Result<()> {
        if !self.input.exists() {
            return Err(anyhow!("Input path does not exist: {}", self.input.display()));
        }

        let Some(archive_path) = self.archive_path(settings)? else {
            println!("Cancelled, nothing was written");
            return Ok(());
        };

        info!("Serializing {} into {}", self.input.display(), archive_path.display());
        let pb = spinner(settings.show_progress, "Scanning files...")?;
        let summary = Archiver::new()
            .with_path_encoding(settings.path_encoding)
            .with_observer(report(&pb))
            .serialize(&self.input, &archive_path)?;
        pb.finish_and_clear();

        println!("✅ Serialized {} entries", summary.entries);
        println!("📁 Directories: {}, files: {}", summary.directories, summary.files);
        println!("💾 Size: {:.2} MB", summary.payload_bytes as f64 / 1024.0 / 1024.0);
        println!("📦 Archive: {}", archive_path.display());
        Ok(())
    }

    /// Works out where the archive goes. A directory target gets a fresh
    /// `<name>.<ext>` archive (replacing an existing one only after
    /// confirmation); a file target is used as-is so the rights recorded in
    /// it are merged. `None` means the user declined to overwrite.
    fn archive_path(&self, settings: &Settings) -> Result<Option<PathBuf>> {
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| parent_dir(&self.input));

        if !output.is_dir() {
            if !settings.has_archive_extension(&output) {
                return Err(anyhow!(
                    "Output file must have the .{} extension: {}",
                    settings.archive_extension,
                    output.display()
                ));
            }
            return Ok(Some(output));
        }

        let archive_path = output
            .join(Path::new(&root_name(&self.input)?).with_extension(&settings.archive_extension));

        if archive_path.exists() {
            let question = format!(
                "{} already exists. Overwrite it? To keep the permissions recorded in it, pass the \
                 archive file itself as the output instead.",
                archive_path.display()
            );
            if !settings.assume_yes && !confirm(&question)? {
                return Ok(None);
            }
            std::fs::remove_file(&archive_path)
                .with_context(|| format!("Failed to remove {}", archive_path.display()))?;
            info!("Removed existing archive {}", archive_path.display());
        }

        Ok(Some(archive_path))
    }
}

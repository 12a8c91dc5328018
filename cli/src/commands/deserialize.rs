use super::{parent_dir, report, spinner};
use crate::config::Settings;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use kser_core::Archiver;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct DeserializeCommand {
    #[arg(help = "Archive to extract")]
    archive: PathBuf,

    #[arg(help = "Directory to recreate the tree in (defaults to the archive's directory)")]
    output: Option<PathBuf>,
}

impl DeserializeCommand {
    pub fn run(&self, settings: &Settings) -> Result<()> {
        self.validate(settings)?;

        let output = self
            .output
            .clone()
            .unwrap_or_else(|| parent_dir(&self.archive));

        info!("Deserializing {} into {}", self.archive.display(), output.display());
        let pb = spinner(settings.show_progress, "Extracting...")?;
        let summary = Archiver::new()
            .with_path_encoding(settings.path_encoding)
            .with_observer(report(&pb))
            .deserialize(&self.archive, &output)
            .with_context(|| format!("Failed to deserialize {}", self.archive.display()))?;
        pb.finish_and_clear();

        println!("✅ Deserialized {} entries", summary.entries);
        println!("📁 Directories: {}, files: {}", summary.directories, summary.files);
        println!("📂 Location: {}", output.display());
        Ok(())
    }

    fn validate(&self, settings: &Settings) -> Result<()> {
        if self.archive.is_dir() {
            return Err(anyhow!(
                "Input must be a .{} file, not a directory",
                settings.archive_extension
            ));
        }
        if !settings.has_archive_extension(&self.archive) {
            return Err(anyhow!(
                "Input file must have the .{} extension",
                settings.archive_extension
            ));
        }
        let metadata = std::fs::metadata(&self.archive)
            .with_context(|| format!("Cannot open {}", self.archive.display()))?;
        if metadata.len() == 0 {
            return Err(anyhow!(
                "{} is empty, nothing to deserialize",
                self.archive.display()
            ));
        }
        Ok(())
    }
}

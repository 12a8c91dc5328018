use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use kser_core::PathEncoding;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_EXTENSION: &str = "kser";

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub archive_extension: Option<String>,
    pub path_encoding: Option<String>,
    pub assume_yes: Option<bool>,
}

impl ConfigFile {
    /// `config.toml` in the platform configuration directory for kser.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "kser").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Loads an explicitly requested file (which must exist), or the default
    /// location if it exists, or falls back to defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                debug!("Using config file {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}

/// Effective settings after merging the config file with command-line flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub archive_extension: String,
    pub path_encoding: PathEncoding,
    pub assume_yes: bool,
    pub show_progress: bool,
}

impl Settings {
    pub fn resolve(
        file: ConfigFile,
        path_encoding: Option<&str>,
        assume_yes: bool,
        show_progress: bool,
    ) -> Result<Self> {
        let archive_extension = file
            .archive_extension
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
            .trim_start_matches('.')
            .to_string();
        if archive_extension.is_empty() {
            return Err(anyhow!("archive_extension must not be empty"));
        }

        let path_encoding = match path_encoding.or(file.path_encoding.as_deref()) {
            Some(name) => name.parse::<PathEncoding>().map_err(|e| anyhow!(e))?,
            None => PathEncoding::native(),
        };

        Ok(Self {
            archive_extension,
            path_encoding,
            assume_yes: assume_yes || file.assume_yes.unwrap_or(false),
            show_progress,
        })
    }

    pub fn has_archive_extension(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(self.archive_extension.as_str()))
    }
}

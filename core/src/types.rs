use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Permission model whose rights value an adapter can read and apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Platform {
    Windows,
    Posix,
}

impl Platform {
    pub fn native() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }

    /// The platform whose rights field this one cannot determine itself.
    pub fn foreign(self) -> Self {
        match self {
            Platform::Windows => Platform::Posix,
            Platform::Posix => Platform::Windows,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Windows => write!(f, "windows"),
            Platform::Posix => write!(f, "posix"),
        }
    }
}

/// One archived file or directory.
///
/// `relative_path` is the identity key: `/`-separated, rooted at the parent
/// of the archived root, so the root entry is just its own name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub is_directory: bool,
    pub relative_path: String,
    pub windows_rights: u32,
    pub posix_mode: u32,
    pub size: u64,
    /// Where the payload is read from while serializing. Never persisted.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Entry {
    pub fn directory(relative_path: impl Into<String>) -> Self {
        Self {
            is_directory: true,
            relative_path: relative_path.into(),
            windows_rights: 0,
            posix_mode: 0,
            size: 0,
            source_path: None,
        }
    }

    pub fn file(relative_path: impl Into<String>, size: u64) -> Self {
        Self {
            is_directory: false,
            relative_path: relative_path.into(),
            windows_rights: 0,
            posix_mode: 0,
            size,
            source_path: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source_path = Some(source.into());
        self
    }

    pub fn rights(&self, platform: Platform) -> u32 {
        match platform {
            Platform::Windows => self.windows_rights,
            Platform::Posix => self.posix_mode,
        }
    }

    pub fn set_rights(&mut self, platform: Platform, rights: u32) {
        match platform {
            Platform::Windows => self.windows_rights = rights,
            Platform::Posix => self.posix_mode = rights,
        }
    }

    /// Whether this entry contributes bytes to the payload section.
    pub fn has_payload(&self) -> bool {
        !self.is_directory && self.size > 0
    }
}

/// Counts reported back to the caller after a serialize or deserialize run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub directories: usize,
    pub files: usize,
    pub payload_bytes: u64,
}

impl ArchiveSummary {
    pub fn from_entries(entries: &[Entry]) -> Self {
        let directories = entries.iter().filter(|e| e.is_directory).count();
        Self {
            entries: entries.len(),
            directories,
            files: entries.len() - directories,
            payload_bytes: checked_payload_len(entries).unwrap_or(u64::MAX),
        }
    }
}

/// Total payload size of `entries`, or `None` if it does not fit in a `u64`.
pub fn checked_payload_len(entries: &[Entry]) -> Option<u64> {
    entries
        .iter()
        .filter(|e| e.has_payload())
        .try_fold(0u64, |total, e| total.checked_add(e.size))
}

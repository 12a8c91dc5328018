use std::fmt;
use std::path::PathBuf;

/// Progress notifications emitted while serializing or deserializing.
///
/// Callers register an observer on [`crate::Archiver`] to turn these into a
/// log view or a progress indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEvent {
    Scanned { relative_path: String, is_directory: bool },
    Skipped { path: PathBuf, reason: String },
    Created { path: PathBuf, is_directory: bool },
    WroteData { path: PathBuf, bytes: u64 },
    PermissionsApplied { path: PathBuf, rights: u32 },
}

impl fmt::Display for ArchiveEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveEvent::Scanned { relative_path, .. } => {
                write!(f, "read permissions for {}", relative_path)
            }
            ArchiveEvent::Skipped { path, reason } => {
                write!(f, "skipped {} ({})", path.display(), reason)
            }
            ArchiveEvent::Created { path, .. } => write!(f, "created {}", path.display()),
            ArchiveEvent::WroteData { path, bytes } => {
                write!(f, "wrote {} bytes to {}", bytes, path.display())
            }
            ArchiveEvent::PermissionsApplied { path, .. } => {
                write!(f, "set permissions for {}", path.display())
            }
        }
    }
}

pub type Observer<'a> = Box<dyn FnMut(&ArchiveEvent) + 'a>;

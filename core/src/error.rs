use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid archive: {0}")]
    Format(String),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read permissions for {}: {reason}", path.display())]
    PermissionRead { path: PathBuf, reason: String },

    #[error("Failed to set permissions for {}: {reason}", path.display())]
    PermissionApply { path: PathBuf, reason: String },
}

/// Coarse classification of an [`Error`], for callers that only need to know
/// which stage of an archive run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Io,
    PermissionRead,
    PermissionApply,
}

impl Error {
    pub fn io<P: AsRef<Path>>(path: P, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn format<S: Into<String>>(message: S) -> Self {
        Error::Format(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Format(_) => ErrorKind::Format,
            Error::Io { .. } => ErrorKind::Io,
            Error::PermissionRead { .. } => ErrorKind::PermissionRead,
            Error::PermissionApply { .. } => ErrorKind::PermissionApply,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mentions_path() {
        let err = Error::io(
            "out/root/a.txt",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), ErrorKind::Io);
        let message = err.to_string();
        assert!(message.contains("out/root/a.txt"));
        assert!(message.contains("denied"));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::format("short").kind(), ErrorKind::Format);
        let read = Error::PermissionRead {
            path: PathBuf::from("x"),
            reason: "no ACE".into(),
        };
        assert_eq!(read.kind(), ErrorKind::PermissionRead);
    }
}

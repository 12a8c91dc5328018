use super::PermissionAdapter;
use crate::{Error, Platform, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Permission bits covered by an archived POSIX mode (rwx for owner, group
/// and other plus setuid, setgid and sticky).
pub const MODE_MASK: u32 = 0o7777;

/// POSIX mode bits. The mode is a complete description of an entry's
/// permissions, so applying it is a plain `chmod`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixPermissions;

impl PermissionAdapter for PosixPermissions {
    fn platform(&self) -> Platform {
        Platform::Posix
    }

    fn read_current(&self, path: &Path) -> Result<u32> {
        let metadata = fs::symlink_metadata(path).map_err(|e| Error::PermissionRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(metadata.permissions().mode() & MODE_MASK)
    }

    fn apply(&self, path: &Path, rights: u32, _is_directory: bool) -> Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(rights & MODE_MASK)).map_err(|e| {
            Error::PermissionApply {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_apply_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();

        let adapter = PosixPermissions;
        adapter.apply(&file, 0o640, false).unwrap();
        assert_eq!(adapter.read_current(&file).unwrap(), 0o640);

        adapter.apply(dir.path(), 0o750, true).unwrap();
        assert_eq!(adapter.read_current(dir.path()).unwrap(), 0o750);
    }

    #[test]
    fn test_read_missing_path_is_permission_read_error() {
        let dir = TempDir::new().unwrap();
        let err = PosixPermissions
            .read_current(&dir.path().join("missing"))
            .unwrap_err();
        assert!(matches!(err, Error::PermissionRead { .. }));
    }

    #[test]
    fn test_zero_is_applied_literally() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("locked");
        fs::write(&file, b"").unwrap();

        PosixPermissions.apply(&file, 0, false).unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode() & MODE_MASK;
        assert_eq!(mode, 0);
    }
}

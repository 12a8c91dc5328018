use kser_core::codec::{self, PathEncoding};
use kser_core::{
    ArchiveEvent, Archiver, Entry, Error, ErrorKind, PermissionAdapter, Platform, Result,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Permission double that reports a fixed value for every path and records
/// what it was asked to apply.
struct FakeRights {
    platform: Platform,
    value: u32,
    applied: RefCell<HashMap<PathBuf, u32>>,
}

impl FakeRights {
    fn new(platform: Platform, value: u32) -> Self {
        Self {
            platform,
            value,
            applied: RefCell::new(HashMap::new()),
        }
    }
}

impl PermissionAdapter for FakeRights {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn read_current(&self, _path: &Path) -> Result<u32> {
        Ok(self.value)
    }

    fn apply(&self, path: &Path, rights: u32, _is_directory: bool) -> Result<()> {
        self.applied.borrow_mut().insert(path.to_path_buf(), rights);
        Ok(())
    }
}

/// Permission double that fails on one file name and succeeds elsewhere.
struct FailingRights {
    fail_on: &'static str,
    fail_reads: bool,
}

impl FailingRights {
    fn hits(&self, path: &Path) -> bool {
        path.file_name().is_some_and(|name| name == self.fail_on)
    }
}

impl PermissionAdapter for FailingRights {
    fn platform(&self) -> Platform {
        Platform::Posix
    }

    fn read_current(&self, path: &Path) -> Result<u32> {
        if self.fail_reads && self.hits(path) {
            return Err(Error::PermissionRead {
                path: path.to_path_buf(),
                reason: "access denied".to_string(),
            });
        }
        Ok(0o644)
    }

    fn apply(&self, path: &Path, _rights: u32, _is_directory: bool) -> Result<()> {
        if !self.fail_reads && self.hits(path) {
            return Err(Error::PermissionApply {
                path: path.to_path_buf(),
                reason: "access denied".to_string(),
            });
        }
        Ok(())
    }
}

fn sample_tree() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("root");
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("a.txt"), b"hello").unwrap();
    fs::write(root.join("sub").join("b.txt"), b"").unwrap();
    (dir, root)
}

fn archive_entries(archive: &Path) -> Vec<Entry> {
    let (_, header) = codec::open_archive(archive, PathEncoding::Utf8).unwrap();
    header.entries
}

#[test]
fn test_two_file_directory_layout() {
    let (dir, root) = sample_tree();
    let archive = dir.path().join("root.kser");

    let summary = Archiver::new()
        .with_adapter(FakeRights::new(Platform::Posix, 0o644))
        .with_path_encoding(PathEncoding::Utf8)
        .serialize(&root, &archive)
        .unwrap();
    assert_eq!(summary.entries, 4);
    assert_eq!(summary.payload_bytes, 5);

    let bytes = fs::read(&archive).unwrap();
    assert_eq!(&bytes[..4], &4u32.to_le_bytes());

    let entries = archive_entries(&archive);
    let paths: Vec<&str> = entries.iter().map(|e| e.relative_path.as_str()).collect();
    assert_eq!(paths, ["root", "root/a.txt", "root/sub", "root/sub/b.txt"]);

    let header_len = codec::header_len(&entries, PathEncoding::Utf8) as usize;
    assert_eq!(&bytes[header_len..], b"hello");
}

#[test]
fn test_deserialize_reproduces_tree() {
    let (dir, root) = sample_tree();
    let archive = dir.path().join("root.kser");
    let out = dir.path().join("out");

    Archiver::new()
        .with_adapter(FakeRights::new(Platform::Posix, 0o640))
        .with_path_encoding(PathEncoding::Utf8)
        .serialize(&root, &archive)
        .unwrap();

    let adapter = FakeRights::new(Platform::Posix, 0);
    let summary = Archiver::new()
        .with_adapter(&adapter)
        .with_path_encoding(PathEncoding::Utf8)
        .deserialize(&archive, &out)
        .unwrap();

    assert_eq!(summary.entries, 4);
    assert_eq!(fs::read(out.join("root/a.txt")).unwrap(), b"hello");
    assert_eq!(fs::read(out.join("root/sub/b.txt")).unwrap(), b"");
    assert!(out.join("root/sub").is_dir());

    let applied = adapter.applied.borrow();
    assert_eq!(applied.len(), 4);
    assert!(applied.values().all(|rights| *rights == 0o640));
}

#[test]
fn test_reserialize_keeps_foreign_rights() {
    let (dir, root) = sample_tree();
    let archive = dir.path().join("root.kser");
    const WINDOWS_MASK: u32 = 0x001f_01ff;

    // First run on a "Windows" host records only the access mask.
    Archiver::new()
        .with_adapter(FakeRights::new(Platform::Windows, WINDOWS_MASK))
        .with_path_encoding(PathEncoding::Utf8)
        .serialize(&root, &archive)
        .unwrap();
    assert!(archive_entries(&archive)
        .iter()
        .all(|e| e.windows_rights == WINDOWS_MASK && e.posix_mode == 0));

    // Second run on a POSIX host fills in the mode and keeps the mask.
    fs::write(root.join("new.txt"), b"fresh").unwrap();
    Archiver::new()
        .with_adapter(FakeRights::new(Platform::Posix, 0o600))
        .with_path_encoding(PathEncoding::Utf8)
        .serialize(&root, &archive)
        .unwrap();

    let entries = archive_entries(&archive);
    for entry in &entries {
        assert_eq!(entry.posix_mode, 0o600, "{}", entry.relative_path);
        let expected = if entry.relative_path == "root/new.txt" { 0 } else { WINDOWS_MASK };
        assert_eq!(entry.windows_rights, expected, "{}", entry.relative_path);
    }
}

#[test]
fn test_serialize_twice_is_byte_identical() {
    let (dir, root) = sample_tree();
    let archive = dir.path().join("root.kser");
    let mut archiver = Archiver::new()
        .with_adapter(FakeRights::new(Platform::Posix, 0o644))
        .with_path_encoding(PathEncoding::Utf8);

    archiver.serialize(&root, &archive).unwrap();
    let first = fs::read(&archive).unwrap();
    archiver.serialize(&root, &archive).unwrap();
    let second = fs::read(&archive).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_prefix_ordering() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("t");
    fs::create_dir_all(root.join("a")).unwrap();
    fs::write(root.join("a").join("b"), b"1").unwrap();
    fs::write(root.join("ab"), b"2").unwrap();
    let archive = dir.path().join("t.kser");

    Archiver::new()
        .with_adapter(FakeRights::new(Platform::Posix, 0o644))
        .with_path_encoding(PathEncoding::Utf8)
        .serialize(&root, &archive)
        .unwrap();

    let entries = archive_entries(&archive);
    let paths: Vec<&str> = entries.iter().map(|e| e.relative_path.as_str()).collect();
    assert_eq!(paths, ["t", "t/a", "t/a/b", "t/ab"]);
    assert!(fs::read(&archive).unwrap().ends_with(b"12"));
}

#[test]
fn test_empty_archives_create_nothing() {
    let dir = TempDir::new().unwrap();
    let empty = dir.path().join("empty.kser");
    fs::write(&empty, b"").unwrap();
    let zero = dir.path().join("zero.kser");
    fs::write(&zero, 0u32.to_le_bytes()).unwrap();

    for archive in [&empty, &zero] {
        let out = dir.path().join("out");
        let summary = Archiver::new()
            .with_adapter(FakeRights::new(Platform::Posix, 0))
            .with_path_encoding(PathEncoding::Utf8)
            .deserialize(archive, &out)
            .unwrap();
        assert_eq!(summary.entries, 0);
        assert!(!out.exists());
    }
}

#[test]
fn test_random_bytes_are_rejected() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("noise.kser");
    let noise: Vec<u8> = (0u32..257).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect();
    fs::write(&archive, &noise).unwrap();
    let out = dir.path().join("out");

    let err = Archiver::new()
        .with_adapter(FakeRights::new(Platform::Posix, 0))
        .with_path_encoding(PathEncoding::Utf8)
        .deserialize(&archive, &out)
        .unwrap_err();

    assert!(matches!(err, Error::Format(_)));
    assert!(!out.exists());
}

#[test]
fn test_trailing_garbage_is_rejected() {
    let (dir, root) = sample_tree();
    let archive = dir.path().join("root.kser");
    Archiver::new()
        .with_adapter(FakeRights::new(Platform::Posix, 0o644))
        .with_path_encoding(PathEncoding::Utf8)
        .serialize(&root, &archive)
        .unwrap();

    let mut bytes = fs::read(&archive).unwrap();
    bytes.push(0);
    fs::write(&archive, &bytes).unwrap();

    let err = Archiver::new()
        .with_adapter(FakeRights::new(Platform::Posix, 0))
        .with_path_encoding(PathEncoding::Utf8)
        .deserialize(&archive, dir.path().join("out"))
        .unwrap_err();
    assert!(matches!(err, Error::Format(_)));
}

#[test]
fn test_malformed_target_is_not_overwritten() {
    let (dir, root) = sample_tree();
    let archive = dir.path().join("root.kser");
    fs::write(&archive, b"definitely not an archive").unwrap();

    let err = Archiver::new()
        .with_adapter(FakeRights::new(Platform::Posix, 0o644))
        .with_path_encoding(PathEncoding::Utf8)
        .serialize(&root, &archive)
        .unwrap_err();

    assert!(matches!(err, Error::Format(_)));
    assert_eq!(fs::read(&archive).unwrap(), b"definitely not an archive");
}

#[test]
fn test_unreadable_rights_abort_serialize() {
    let (dir, root) = sample_tree();
    let archive = dir.path().join("root.kser");
    let adapter = FailingRights {
        fail_on: "a.txt",
        fail_reads: true,
    };

    let err = Archiver::new()
        .with_adapter(&adapter)
        .with_path_encoding(PathEncoding::Utf8)
        .serialize(&root, &archive)
        .unwrap_err();
    assert!(matches!(err, Error::PermissionRead { ref path, .. } if path.ends_with("a.txt")));
    assert!(!archive.exists());

    // An existing archive is left as it was.
    Archiver::new()
        .with_adapter(FakeRights::new(Platform::Posix, 0o644))
        .with_path_encoding(PathEncoding::Utf8)
        .serialize(&root, &archive)
        .unwrap();
    let before = fs::read(&archive).unwrap();

    let err = Archiver::new()
        .with_adapter(&adapter)
        .with_path_encoding(PathEncoding::Utf8)
        .serialize(&root, &archive)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionRead);
    assert_eq!(fs::read(&archive).unwrap(), before);
}

#[test]
fn test_failed_apply_stops_deserialize() {
    let (dir, root) = sample_tree();
    let archive = dir.path().join("root.kser");
    let out = dir.path().join("out");
    Archiver::new()
        .with_adapter(FakeRights::new(Platform::Posix, 0o644))
        .with_path_encoding(PathEncoding::Utf8)
        .serialize(&root, &archive)
        .unwrap();

    let err = Archiver::new()
        .with_adapter(FailingRights {
            fail_on: "a.txt",
            fail_reads: false,
        })
        .with_path_encoding(PathEncoding::Utf8)
        .deserialize(&archive, &out)
        .unwrap_err();

    assert!(matches!(err, Error::PermissionApply { ref path, .. } if path.ends_with("a.txt")));
    assert_eq!(fs::read(out.join("root/a.txt")).unwrap(), b"hello");
    assert!(!out.join("root/sub").exists());
}

#[test]
fn test_observer_sees_every_entry() {
    let (dir, root) = sample_tree();
    let archive = dir.path().join("root.kser");
    let mut scanned = Vec::new();

    Archiver::new()
        .with_adapter(FakeRights::new(Platform::Posix, 0o644))
        .with_path_encoding(PathEncoding::Utf8)
        .with_observer(|event| {
            if let ArchiveEvent::Scanned { relative_path, .. } = event {
                scanned.push(relative_path.clone());
            }
        })
        .serialize(&root, &archive)
        .unwrap();

    scanned.sort();
    assert_eq!(scanned, ["root", "root/a.txt", "root/sub", "root/sub/b.txt"]);
}

#[test]
fn test_utf16_archive_roundtrip() {
    let (dir, root) = sample_tree();
    fs::write(root.join("grüße.txt"), b"hi").unwrap();
    let archive = dir.path().join("root.kser");
    let out = dir.path().join("out");

    Archiver::new()
        .with_adapter(FakeRights::new(Platform::Windows, 0x1200a9))
        .with_path_encoding(PathEncoding::Utf16Le)
        .serialize(&root, &archive)
        .unwrap();

    // Reading with the wrong encoding must not silently succeed.
    assert!(codec::open_archive(&archive, PathEncoding::Utf8).is_err());

    Archiver::new()
        .with_adapter(FakeRights::new(Platform::Windows, 0))
        .with_path_encoding(PathEncoding::Utf16Le)
        .deserialize(&archive, &out)
        .unwrap();
    assert_eq!(fs::read(out.join("root").join("grüße.txt")).unwrap(), b"hi");
}

#[cfg(unix)]
mod posix {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn mode(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o7777
    }

    #[test]
    fn test_native_roundtrip_restores_modes() {
        let (dir, root) = sample_tree();
        fs::set_permissions(root.join("a.txt"), fs::Permissions::from_mode(0o640)).unwrap();
        fs::set_permissions(root.join("sub"), fs::Permissions::from_mode(0o750)).unwrap();
        fs::set_permissions(root.join("sub/b.txt"), fs::Permissions::from_mode(0o600)).unwrap();
        let archive = dir.path().join("root.kser");
        let out = dir.path().join("out");

        kser_core::serialize(&root, &archive).unwrap();
        kser_core::deserialize(&archive, &out).unwrap();

        assert_eq!(mode(&out.join("root/a.txt")), 0o640);
        assert_eq!(mode(&out.join("root/sub")), 0o750);
        assert_eq!(mode(&out.join("root/sub/b.txt")), 0o600);
        assert_eq!(mode(&out.join("root")), mode(&root));
        assert_eq!(fs::read(out.join("root/a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_read_only_directory_is_still_populated() {
        let (dir, root) = sample_tree();
        fs::set_permissions(root.join("sub"), fs::Permissions::from_mode(0o555)).unwrap();
        let archive = dir.path().join("root.kser");
        let out = dir.path().join("out");

        kser_core::serialize(&root, &archive).unwrap();
        kser_core::deserialize(&archive, &out).unwrap();

        assert!(out.join("root/sub/b.txt").is_file());
        assert_eq!(mode(&out.join("root/sub")), 0o555);

        // Let TempDir clean up.
        fs::set_permissions(root.join("sub"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::set_permissions(out.join("root/sub"), fs::Permissions::from_mode(0o755)).unwrap();
    }
}

use crate::events::ArchiveEvent;
use crate::index::OldArchiveIndex;
use crate::permissions::PermissionAdapter;
use crate::{Entry, Error, Result};
use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Walks a file or directory tree and records one [`Entry`] per object.
///
/// The adapter's own rights field is read from the live filesystem; the other
/// platform's field is carried over from `index` by relative path.
pub struct SnapshotWalker<'a, A: PermissionAdapter> {
    adapter: &'a A,
    index: &'a OldArchiveIndex,
    exclude: Option<PathBuf>,
}

impl<'a, A: PermissionAdapter> SnapshotWalker<'a, A> {
    pub fn new(adapter: &'a A, index: &'a OldArchiveIndex) -> Self {
        Self {
            adapter,
            index,
            exclude: None,
        }
    }

    /// Leaves `path` out of the snapshot. Used for the archive being written
    /// when it lives inside the tree being archived.
    pub fn exclude(mut self, path: &Path) -> Self {
        self.exclude = path.canonicalize().ok();
        self
    }

    /// Returns the entries for `root` and everything below it, sorted by
    /// relative path.
    pub fn walk(&self, root: &Path, observer: &mut dyn FnMut(&ArchiveEvent)) -> Result<Vec<Entry>> {
        let root_name = root_name(root)?;
        let own = self.adapter.platform();
        let foreign = own.foreign();
        let mut entries = Vec::new();

        for item in WalkDir::new(root).follow_links(false) {
            let item = item.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                Error::io(path, e.into())
            })?;
            let path = item.path();
            let file_type = item.file_type();

            if !file_type.is_dir() && !file_type.is_file() {
                let reason = if file_type.is_symlink() {
                    "symbolic link"
                } else {
                    "not a regular file or directory"
                };
                warn!("Skipping {}: {}", path.display(), reason);
                observer(&ArchiveEvent::Skipped {
                    path: path.to_path_buf(),
                    reason: reason.to_string(),
                });
                continue;
            }

            if file_type.is_file() && self.is_excluded(path) {
                debug!("Skipping archive being written: {}", path.display());
                observer(&ArchiveEvent::Skipped {
                    path: path.to_path_buf(),
                    reason: "archive being written".to_string(),
                });
                continue;
            }

            let relative_path = relative_path(&root_name, root, path)?;
            let mut entry = if file_type.is_dir() {
                Entry::directory(relative_path)
            } else {
                let metadata = item.metadata().map_err(|e| Error::io(path, e.into()))?;
                Entry::file(relative_path, metadata.len()).with_source(path)
            };

            entry.set_rights(foreign, self.index.rights(&entry.relative_path, foreign));
            entry.set_rights(own, self.adapter.read_current(path)?);

            debug!(
                "Scanned {} (windows {:#x}, posix {:#o}, {} bytes)",
                entry.relative_path, entry.windows_rights, entry.posix_mode, entry.size
            );
            observer(&ArchiveEvent::Scanned {
                relative_path: entry.relative_path.clone(),
                is_directory: entry.is_directory,
            });
            entries.push(entry);
        }

        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(entries)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        match &self.exclude {
            Some(exclude) if exclude.file_name() == path.file_name() => {
                path.canonicalize().is_ok_and(|p| &p == exclude)
            }
            _ => false,
        }
    }
}

/// Name under which the walked root is archived: its last path component.
pub fn root_name(root: &Path) -> Result<String> {
    let name = match root.file_name() {
        Some(name) => name.to_os_string(),
        None => root
            .canonicalize()
            .map_err(|e| Error::io(root, e))?
            .file_name()
            .map(OsStr::to_os_string)
            .ok_or_else(|| {
                Error::io(
                    root,
                    io::Error::new(io::ErrorKind::InvalidInput, "path has no final component to archive"),
                )
            })?,
    };
    utf8_name(root, &name)
}

fn utf8_name(path: &Path, name: &OsStr) -> Result<String> {
    name.to_str().map(str::to_owned).ok_or_else(|| {
        Error::io(
            path,
            io::Error::new(io::ErrorKind::InvalidData, "file name is not valid Unicode"),
        )
    })
}

fn relative_path(root_name: &str, root: &Path, path: &Path) -> Result<String> {
    let below = path.strip_prefix(root).map_err(|_| {
        Error::io(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "entry is outside the archived root"),
        )
    })?;

    let mut relative = root_name.to_string();
    for component in below.components() {
        if let Component::Normal(name) = component {
            relative.push('/');
            relative.push_str(&utf8_name(path, name)?);
        }
    }
    Ok(relative)
}

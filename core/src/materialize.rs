use crate::events::ArchiveEvent;
use crate::permissions::PermissionAdapter;
use crate::{Entry, Error, Result};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Recreates decoded entries under an output directory.
pub struct Materializer<'a, A: PermissionAdapter> {
    adapter: &'a A,
    output_root: PathBuf,
}

impl<'a, A: PermissionAdapter> Materializer<'a, A> {
    pub fn new(adapter: &'a A, output_root: impl Into<PathBuf>) -> Self {
        Self {
            adapter,
            output_root: output_root.into(),
        }
    }

    /// Creates every entry in order, copying each file's `size` bytes from
    /// `payload`, which must be positioned at the start of the payload
    /// section.
    ///
    /// File rights are applied as soon as the file is written. Directory
    /// rights are applied once everything has been written, deepest first,
    /// so a directory recorded without write access can still be filled.
    /// The first failure aborts the run; anything already created stays.
    pub fn materialize<R: Read>(
        &self,
        entries: &[Entry],
        payload: &mut R,
        observer: &mut dyn FnMut(&ArchiveEvent),
    ) -> Result<()> {
        let platform = self.adapter.platform();
        let mut directories = Vec::new();

        fs::create_dir_all(&self.output_root).map_err(|e| Error::io(&self.output_root, e))?;

        for entry in entries {
            let target = output_path(&self.output_root, &entry.relative_path)?;
            if let Some(parent) = target.parent() {
                if !parent.is_dir() {
                    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
                }
            }

            if entry.is_directory {
                match fs::create_dir(&target) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists && target.is_dir() => {}
                    Err(e) => return Err(Error::io(&target, e)),
                }
                debug!("Created directory {}", target.display());
                observer(&ArchiveEvent::Created {
                    path: target.clone(),
                    is_directory: true,
                });
                directories.push((target, entry.rights(platform)));
                continue;
            }

            let mut file = File::create(&target).map_err(|e| Error::io(&target, e))?;
            observer(&ArchiveEvent::Created {
                path: target.clone(),
                is_directory: false,
            });

            let copied = io::copy(&mut Read::take(&mut *payload, entry.size), &mut file)
                .map_err(|e| Error::io(&target, e))?;
            if copied != entry.size {
                return Err(Error::format(format!(
                    "archive ended after {} of {} payload bytes for '{}'",
                    copied, entry.size, entry.relative_path
                )));
            }
            drop(file);
            debug!("Wrote {} bytes to {}", copied, target.display());
            observer(&ArchiveEvent::WroteData {
                path: target.clone(),
                bytes: copied,
            });

            self.apply(&target, entry.rights(platform), false, observer)?;
        }

        for (target, rights) in directories.iter().rev() {
            self.apply(target, *rights, true, observer)?;
        }

        Ok(())
    }

    fn apply(
        &self,
        target: &Path,
        rights: u32,
        is_directory: bool,
        observer: &mut dyn FnMut(&ArchiveEvent),
    ) -> Result<()> {
        self.adapter.apply(target, rights, is_directory)?;
        observer(&ArchiveEvent::PermissionsApplied {
            path: target.to_path_buf(),
            rights,
        });
        Ok(())
    }
}

/// Joins an archived relative path onto `output_root`, refusing anything
/// that is not a plain sequence of names.
pub fn output_path(output_root: &Path, relative_path: &str) -> Result<PathBuf> {
    let mut target = output_root.to_path_buf();
    for segment in relative_path.split('/') {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => target.push(name),
            _ => {
                return Err(Error::format(format!(
                    "entry path '{}' cannot be extracted safely",
                    relative_path
                )))
            }
        }
    }
    Ok(target)
}

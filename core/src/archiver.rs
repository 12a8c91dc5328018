use crate::codec::{self, ArchiveHeader, PathEncoding};
use crate::events::{ArchiveEvent, Observer};
use crate::index::OldArchiveIndex;
use crate::materialize::Materializer;
use crate::permissions::{NativePermissions, PermissionAdapter};
use crate::snapshot::SnapshotWalker;
use crate::{ArchiveSummary, Result};
use std::path::Path;
use tracing::info;

/// Entry point for writing and extracting permission-preserving archives.
///
/// An archive records, for every file and directory, both the Windows access
/// mask of the archiving user and the POSIX mode bits. Only one of the two can
/// be read on any given host, so serializing over an existing archive keeps
/// the other platform's values from it instead of resetting them.
///
/// # Examples
///
/// ```no_run
/// use kser_core::Archiver;
///
/// fn main() -> kser_core::Result<()> {
///     let mut archiver = Archiver::new()
///         .with_observer(|event| println!("{}", event));
///
///     // Creates project.kser, or refreshes it while keeping the rights
///     // recorded for the other platform.
///     archiver.serialize("./project", "./project.kser")?;
///
///     // Recreates ./restored/project with contents and permissions.
///     archiver.deserialize("./project.kser", "./restored")?;
///     Ok(())
/// }
/// ```
pub struct Archiver<'o, A = NativePermissions> {
    adapter: A,
    encoding: PathEncoding,
    observer: Option<Observer<'o>>,
}

impl Archiver<'_, NativePermissions> {
    /// An archiver using the permission model of the build target and its
    /// native path encoding.
    pub fn new() -> Self {
        Self {
            adapter: NativePermissions::default(),
            encoding: PathEncoding::native(),
            observer: None,
        }
    }
}

impl Default for Archiver<'_, NativePermissions> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'o, A: PermissionAdapter> Archiver<'o, A> {
    /// Replaces the permission adapter, e.g. with a test double.
    pub fn with_adapter<B: PermissionAdapter>(self, adapter: B) -> Archiver<'o, B> {
        Archiver {
            adapter,
            encoding: self.encoding,
            observer: self.observer,
        }
    }

    /// Sets the encoding of entry paths. Archives must be read back with the
    /// encoding they were written with.
    pub fn with_path_encoding(mut self, encoding: PathEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_observer(mut self, observer: impl FnMut(&ArchiveEvent) + 'o) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn path_encoding(&self) -> PathEncoding {
        self.encoding
    }

    /// Archives `source` (a file or a directory tree) into `archive_path`.
    ///
    /// If `archive_path` already holds an archive, the rights it recorded for
    /// the platform this adapter cannot read are carried over per relative
    /// path. The file is then fully rewritten.
    ///
    /// # Errors
    ///
    /// Returns `Error::Format` if an existing, non-empty `archive_path` is not
    /// a valid archive (it is left untouched in that case).
    /// Returns `Error::PermissionRead` if the rights of any entry cannot be
    /// determined.
    /// Returns `Error::Io` if walking the source, reading a file, or writing
    /// the archive fails.
    pub fn serialize<S: AsRef<Path>, P: AsRef<Path>>(
        &mut self,
        source: S,
        archive_path: P,
    ) -> Result<ArchiveSummary> {
        let source = source.as_ref();
        let archive_path = archive_path.as_ref();

        let index = OldArchiveIndex::load(archive_path, self.encoding)?;
        if !index.is_empty() {
            info!(
                "Merging {} permissions from {} ({} entries)",
                self.adapter.platform().foreign(),
                archive_path.display(),
                index.len()
            );
        }

        let observer = &mut self.observer;
        let mut notify = |event: &ArchiveEvent| {
            if let Some(observer) = observer.as_mut() {
                observer(event);
            }
        };

        info!("Scanning {}", source.display());
        let entries = SnapshotWalker::new(&self.adapter, &index)
            .exclude(archive_path)
            .walk(source, &mut notify)?;

        codec::write_archive(archive_path, &entries, self.encoding)?;

        let summary = ArchiveSummary::from_entries(&entries);
        info!(
            "Serialized {} entries ({} bytes of file data) into {}",
            summary.entries,
            summary.payload_bytes,
            archive_path.display()
        );
        Ok(summary)
    }

    /// Recreates the archived tree under `output_dir`, which is created if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns `Error::Format` if `archive_path` is not a well-formed archive;
    /// nothing is created in that case.
    /// Returns `Error::Io` or `Error::PermissionApply` if creating an entry or
    /// installing its rights fails. Entries created before the failure are
    /// left in place.
    pub fn deserialize<P: AsRef<Path>, O: AsRef<Path>>(
        &mut self,
        archive_path: P,
        output_dir: O,
    ) -> Result<ArchiveSummary> {
        let archive_path = archive_path.as_ref();
        let output_dir = output_dir.as_ref();

        let (mut reader, header) = codec::open_archive(archive_path, self.encoding)?;
        if header.entries.is_empty() {
            info!("{} contains no entries", archive_path.display());
            return Ok(ArchiveSummary::default());
        }

        let observer = &mut self.observer;
        let mut notify = |event: &ArchiveEvent| {
            if let Some(observer) = observer.as_mut() {
                observer(event);
            }
        };

        Materializer::new(&self.adapter, output_dir).materialize(
            &header.entries,
            &mut reader,
            &mut notify,
        )?;

        let summary = ArchiveSummary::from_entries(&header.entries);
        info!(
            "Deserialized {} entries from {} into {}",
            summary.entries,
            archive_path.display(),
            output_dir.display()
        );
        Ok(summary)
    }

    /// Decodes and validates the header table without extracting anything.
    pub fn read_header<P: AsRef<Path>>(&self, archive_path: P) -> Result<ArchiveHeader> {
        let (_, header) = codec::open_archive(archive_path.as_ref(), self.encoding)?;
        Ok(header)
    }
}

pub mod archiver;
pub mod codec;
pub mod error;
pub mod events;
pub mod index;
pub mod materialize;
pub mod permissions;
pub mod snapshot;
pub mod types;

pub use archiver::Archiver;
pub use codec::{ArchiveHeader, PathEncoding};
pub use error::{Error, ErrorKind, Result};
pub use events::ArchiveEvent;
pub use permissions::{NativePermissions, PermissionAdapter};
pub use types::*;

use std::path::Path;

/// Archives `source` into `archive_path` with the native permission adapter,
/// merging foreign-platform rights from an existing archive at that path.
pub fn serialize<S: AsRef<Path>, P: AsRef<Path>>(source: S, archive_path: P) -> Result<ArchiveSummary> {
    Archiver::new().serialize(source, archive_path)
}

/// Recreates the tree stored in `archive_path` under `output_dir`.
pub fn deserialize<P: AsRef<Path>, O: AsRef<Path>>(archive_path: P, output_dir: O) -> Result<ArchiveSummary> {
    Archiver::new().deserialize(archive_path, output_dir)
}

use crate::codec::{self, PathEncoding};
use crate::{Entry, Platform, Result};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use tracing::debug;

/// Entries of a previously written archive, keyed by relative path.
///
/// Only consulted while serializing, to carry forward the rights field the
/// running platform cannot read for itself.
#[derive(Debug, Clone, Default)]
pub struct OldArchiveIndex {
    entries: HashMap<String, Entry>,
}

impl OldArchiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the header table of an existing archive. A missing or empty
    /// file is not an error and yields an empty index.
    pub fn load(archive_path: &Path, encoding: PathEncoding) -> Result<Self> {
        match std::fs::metadata(archive_path) {
            Ok(metadata) if metadata.len() == 0 => return Ok(Self::new()),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(crate::Error::io(archive_path, e)),
        }

        let (_, header) = codec::open_archive(archive_path, encoding)?;
        debug!(
            "Loaded {} entries from previous archive {}",
            header.entries.len(),
            archive_path.display()
        );
        Ok(Self::from_entries(header.entries))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.relative_path.clone(), entry))
                .collect(),
        }
    }

    pub fn get(&self, relative_path: &str) -> Option<&Entry> {
        self.entries.get(relative_path)
    }

    /// Previously recorded rights of `platform` for `relative_path`, or `0`
    /// when the path was not in the old archive.
    pub fn rights(&self, relative_path: &str, platform: Platform) -> u32 {
        self.get(relative_path)
            .map(|entry| entry.rights(platform))
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Binary archive layout.
//!
//! ```text
//! u32 entry_count
//! entry_count times:
//!     u8          is_directory (0 or 1)
//!     u32         path_len
//!     [u8; len]   path bytes (UTF-8 or UTF-16LE, `/` separated)
//!     u32         windows_rights
//!     u32         posix_mode
//!     u64         size
//! payload of every non-empty file, in header order
//! ```
//!
//! All integers are little-endian. There is no magic number, version or
//! checksum: anything that does not match this shape exactly is rejected.

use crate::types::checked_payload_len;
use crate::{Entry, Error, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Upper bound on a single encoded path; well above the 32 767 UTF-16 units
/// Windows allows.
pub const MAX_PATH_BYTES: u32 = 65_536;

const COUNT_BYTES: u64 = 4;
/// is_directory + path_len + windows_rights + posix_mode + size
const ENTRY_FIXED_BYTES: u64 = 1 + 4 + 4 + 4 + 8;

/// How relative paths are stored in the header table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathEncoding {
    Utf8,
    Utf16Le,
}

impl PathEncoding {
    /// UTF-16LE on Windows, UTF-8 everywhere else.
    pub fn native() -> Self {
        if cfg!(windows) {
            PathEncoding::Utf16Le
        } else {
            PathEncoding::Utf8
        }
    }

    pub fn encode(self, path: &str) -> Vec<u8> {
        match self {
            PathEncoding::Utf8 => path.as_bytes().to_vec(),
            PathEncoding::Utf16Le => path.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            PathEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|_| Error::format("entry path is not valid UTF-8")),
            PathEncoding::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return Err(Error::format("UTF-16 entry path has an odd byte length"));
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                let path = String::from_utf16(&units)
                    .map_err(|_| Error::format("entry path is not valid UTF-16"))?;
                Ok(path.replace('\\', "/"))
            }
        }
    }

    fn encoded_len(self, path: &str) -> u64 {
        match self {
            PathEncoding::Utf8 => path.len() as u64,
            PathEncoding::Utf16Le => path.encode_utf16().count() as u64 * 2,
        }
    }
}

impl Default for PathEncoding {
    fn default() -> Self {
        Self::native()
    }
}

impl FromStr for PathEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(Self::native()),
            "utf8" | "utf-8" => Ok(PathEncoding::Utf8),
            "utf16" | "utf16le" | "utf-16le" => Ok(PathEncoding::Utf16Le),
            other => Err(format!(
                "unknown path encoding '{}' (expected native, utf8 or utf16le)",
                other
            )),
        }
    }
}

/// The decoded header table of an archive.
#[derive(Debug, Clone, Default)]
pub struct ArchiveHeader {
    pub entries: Vec<Entry>,
    /// Byte offset at which the payload section begins.
    pub payload_offset: u64,
}

impl ArchiveHeader {
    /// Saturates at `u64::MAX`; headers from [`read_header`] never do.
    pub fn payload_len(&self) -> u64 {
        checked_payload_len(&self.entries).unwrap_or(u64::MAX)
    }

    /// Total length a well-formed archive with this header must have.
    pub fn archive_len(&self) -> u64 {
        self.payload_offset.saturating_add(self.payload_len())
    }
}

/// Size in bytes of the header table for `entries`.
pub fn header_len(entries: &[Entry], encoding: PathEncoding) -> u64 {
    COUNT_BYTES
        + entries
            .iter()
            .map(|e| ENTRY_FIXED_BYTES + encoding.encoded_len(&e.relative_path))
            .sum::<u64>()
}

pub fn write_header<W: Write>(writer: &mut W, entries: &[Entry], encoding: PathEncoding) -> io::Result<()> {
    let count = u32::try_from(entries.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many entries for one archive"))?;
    writer.write_all(&count.to_le_bytes())?;

    for entry in entries {
        let path = encoding.encode(&entry.relative_path);
        let path_len = u32::try_from(path.len())
            .ok()
            .filter(|len| *len <= MAX_PATH_BYTES)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("path too long to archive: {}", entry.relative_path),
                )
            })?;

        writer.write_all(&[u8::from(entry.is_directory)])?;
        writer.write_all(&path_len.to_le_bytes())?;
        writer.write_all(&path)?;
        writer.write_all(&entry.windows_rights.to_le_bytes())?;
        writer.write_all(&entry.posix_mode.to_le_bytes())?;
        writer.write_all(&entry.size.to_le_bytes())?;
    }

    Ok(())
}

/// Truncates `archive_path` and writes the header table followed by the
/// payload of every file, streamed from each entry's `source_path`.
pub fn write_archive(archive_path: &Path, entries: &[Entry], encoding: PathEncoding) -> Result<()> {
    let file = File::create(archive_path).map_err(|e| Error::io(archive_path, e))?;
    let mut writer = BufWriter::new(file);

    write_header(&mut writer, entries, encoding).map_err(|e| Error::io(archive_path, e))?;

    for entry in entries.iter().filter(|e| e.has_payload()) {
        let source_path = entry.source_path.as_deref().ok_or_else(|| {
            Error::io(
                archive_path,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no source recorded for {}", entry.relative_path),
                ),
            )
        })?;
        let source = File::open(source_path).map_err(|e| Error::io(source_path, e))?;

        let copied = io::copy(&mut source.take(entry.size), &mut writer)
            .map_err(|e| Error::io(archive_path, e))?;
        if copied != entry.size {
            return Err(Error::io(
                source_path,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file shrank while archiving ({} of {} bytes)", copied, entry.size),
                ),
            ));
        }
        debug!("Archived {} ({} bytes)", entry.relative_path, entry.size);
    }

    writer
        .into_inner()
        .map_err(|e| Error::io(archive_path, e.into_error()))?
        .sync_all()
        .map_err(|e| Error::io(archive_path, e))?;
    Ok(())
}

fn read_array<R: Read, const N: usize>(reader: &mut R, what: &str) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| read_failure(e, what))?;
    Ok(buf)
}

fn read_failure(e: io::Error, what: &str) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::format(format!("unexpected end of archive while reading {}", what))
    } else {
        Error::format(format!("failed to read {}: {}", what, e))
    }
}

/// Checks that an archived path is a plain relative path with no `.`/`..`
/// segments, so materializing it can never leave the output directory.
pub fn validate_relative_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::format("entry with an empty path"));
    }
    if path.contains('\0') {
        return Err(Error::format("entry path contains a NUL character"));
    }
    if path.starts_with('/') {
        return Err(Error::format(format!("absolute entry path '{}'", path)));
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(Error::format(format!("malformed entry path '{}'", path)));
    }
    Ok(())
}

/// Reads the header table, leaving `reader` positioned at the first payload
/// byte. Payload bytes themselves are not touched.
pub fn read_header<R: Read>(reader: &mut R, encoding: PathEncoding) -> Result<ArchiveHeader> {
    let count = u32::from_le_bytes(read_array(reader, "entry count")?);
    let mut entries = Vec::with_capacity(count.min(4096) as usize);
    let mut seen = HashSet::new();
    let mut offset = COUNT_BYTES;

    for index in 0..count {
        let [flag] = read_array::<_, 1>(reader, "entry type")?;
        let is_directory = match flag {
            0 => false,
            1 => true,
            other => {
                return Err(Error::format(format!(
                    "entry {} has invalid directory flag {}",
                    index, other
                )))
            }
        };

        let path_len = u32::from_le_bytes(read_array(reader, "path length")?);
        if path_len > MAX_PATH_BYTES {
            return Err(Error::format(format!(
                "entry {} path length {} exceeds {}",
                index, path_len, MAX_PATH_BYTES
            )));
        }
        let mut path_bytes = vec![0u8; path_len as usize];
        reader
            .read_exact(&mut path_bytes)
            .map_err(|e| read_failure(e, "entry path"))?;
        let relative_path = encoding.decode(&path_bytes)?;
        validate_relative_path(&relative_path)?;

        let windows_rights = u32::from_le_bytes(read_array(reader, "windows rights")?);
        let posix_mode = u32::from_le_bytes(read_array(reader, "posix mode")?);
        let size = u64::from_le_bytes(read_array(reader, "entry size")?);

        if is_directory && size != 0 {
            return Err(Error::format(format!(
                "directory '{}' has non-zero size {}",
                relative_path, size
            )));
        }
        if !seen.insert(relative_path.clone()) {
            return Err(Error::format(format!("duplicate entry '{}'", relative_path)));
        }

        offset += ENTRY_FIXED_BYTES + u64::from(path_len);
        entries.push(Entry {
            is_directory,
            relative_path,
            windows_rights,
            posix_mode,
            size,
            source_path: None,
        });
    }

    checked_payload_len(&entries)
        .and_then(|payload| payload.checked_add(offset))
        .ok_or_else(|| Error::format("archive sizes overflow"))?;

    Ok(ArchiveHeader {
        entries,
        payload_offset: offset,
    })
}

/// Opens an archive file and decodes its header table.
///
/// A zero-byte file decodes to an empty header. Otherwise the file length
/// must equal exactly what the header describes, so a truncated or padded
/// archive is rejected before anything is extracted from it.
pub fn open_archive(archive_path: &Path, encoding: PathEncoding) -> Result<(BufReader<File>, ArchiveHeader)> {
    let file = File::open(archive_path).map_err(|e| Error::io(archive_path, e))?;
    let file_len = file
        .metadata()
        .map_err(|e| Error::io(archive_path, e))?
        .len();
    let mut reader = BufReader::new(file);

    if file_len == 0 {
        return Ok((reader, ArchiveHeader::default()));
    }

    let header = read_header(&mut reader, encoding)?;
    if header.archive_len() != file_len {
        return Err(Error::format(format!(
            "{} is {} bytes but its header describes {} bytes",
            archive_path.display(),
            file_len,
            header.archive_len()
        )));
    }

    Ok((reader, header))
}

//! Container formats.
//!
//! Each container family is handled by a [`FormatCodec`]. Codecs are
//! stateless: the session hands them a seekable source holding the current
//! container bytes and a sink for the rebuilt container, so a codec never
//! knows whether those bytes live on disk, in memory, or inside another
//! archive.
//!
//! The [`FormatRegistry`] maps file extensions to codecs. The process-wide
//! registry starts with the built-in formats:
//!
//! | Category | Extensions | Codec |
//! |----------|------------|-------|
//! | Zip | `zip`, `jar`, `war`, `ear`, `apk` | [`ZipCodec`] |
//! | Tar | `tar`, `tar.gz`, `tgz`, `tar.bz2`, `tbz2`, `tar.xz`, `txz` | [`TarCodec`] |
//! | Compression | `gz`, `bz2`, `xz` | [`SingleFileCodec`] |
//!
//! `bz2` variants require the `bzip2` feature and `xz` variants the `xz`
//! feature; both are on by default.

use std::fmt;
use std::io::{self, Read, Seek, Write};
use std::time::SystemTime;

use crate::config::Config;
use crate::session::Staging;

pub mod compression;
pub mod registry;
pub mod single;
pub mod tar;
pub mod zip;

pub use compression::{Compression, FinishWrite};
pub use registry::FormatRegistry;
pub use single::SingleFileCodec;
pub use tar::TarCodec;
pub use zip::ZipCodec;

/// A readable and seekable byte source.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// A writable and seekable byte sink.
pub trait WriteSeek: Write + Seek {}

impl<T: Write + Seek + ?Sized> WriteSeek for T {}

/// How many members a container holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Any number of named files and directories (zip, tar).
    MultiMember,
    /// Exactly one member named after the container (gzip, bzip2, xz).
    SingleMember,
}

/// Grouping used by [`FormatRegistry::list_formats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormatCategory {
    /// Zip and its derivatives.
    Zip,
    /// Tar, plain or compressed.
    Tar,
    /// Single-file compressions.
    Compression,
    /// Formats registered at runtime.
    Custom,
}

impl fmt::Display for FormatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FormatCategory::Zip => "zip",
            FormatCategory::Tar => "tar",
            FormatCategory::Compression => "compression",
            FormatCategory::Custom => "custom",
        })
    }
}

/// Metadata for one member of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Normalized member path, without leading or trailing `/`.
    pub path: String,
    /// Uncompressed size in bytes; 0 for directories.
    pub size: u64,
    /// Modification time, if the container records one.
    pub modified: Option<SystemTime>,
    /// `true` for directory records.
    pub is_dir: bool,
}

impl EntryInfo {
    /// Creates metadata for a file member.
    pub fn file(path: impl Into<String>, size: u64, modified: Option<SystemTime>) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
            is_dir: false,
        }
    }

    /// Creates metadata for a directory member.
    pub fn directory(path: impl Into<String>, modified: Option<SystemTime>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            modified,
            is_dir: true,
        }
    }
}

/// A container format implementation.
///
/// Codecs report failures as `io::Error`; the session turns failures while
/// reading a container into [`Error::CorruptArchive`](crate::Error::CorruptArchive).
pub trait FormatCodec: Send + Sync + fmt::Debug {
    /// Short name of the format, e.g. `"zip"` or `"tar.gz"`.
    fn name(&self) -> &'static str;

    /// Category reported by [`FormatRegistry::list_formats`].
    fn category(&self) -> FormatCategory;

    /// Whether the container holds one member or many.
    fn kind(&self) -> ContainerKind;

    /// Lists every member of the container.
    ///
    /// Single-member codecs report one entry named `member_name`.
    fn list_entries(&self, source: &mut dyn ReadSeek, member_name: &str) -> io::Result<Vec<EntryInfo>>;

    /// Writes the content of the file member `entry` to `sink`.
    ///
    /// Returns the number of bytes written.
    fn extract(&self, source: &mut dyn ReadSeek, entry: &str, sink: &mut dyn Write) -> io::Result<u64>;

    /// Writes a valid container with no members.
    fn create_empty(&self, sink: &mut dyn Write, config: &Config) -> io::Result<()>;

    /// Writes a new container to `sink` holding every member of `source`
    /// not dropped by `staging`, followed by the staged members.
    ///
    /// `source` is `None` when the container does not exist yet.
    fn rebuild(
        &self,
        source: Option<&mut dyn ReadSeek>,
        staging: &mut Staging,
        sink: &mut dyn WriteSeek,
        config: &Config,
    ) -> io::Result<()>;
}

/// Normalizes a member path for comparison.
///
/// Backslashes become `/`, and leading `./` and `/` as well as trailing `/`
/// are dropped, so `./dir/` and `dir` name the same member.
pub fn normalize_entry_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut trimmed = path.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    let trimmed = trimmed.trim_end_matches('/');
    if trimmed == "." {
        return String::new();
    }
    trimmed
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_entry_path() {
        assert_eq!(normalize_entry_path("dir/"), "dir");
        assert_eq!(normalize_entry_path("./dir/file.txt"), "dir/file.txt");
        assert_eq!(normalize_entry_path("/abs//x"), "abs/x");
        assert_eq!(normalize_entry_path(r"win\style\path"), "win/style/path");
        assert_eq!(normalize_entry_path("./"), "");
        assert_eq!(normalize_entry_path("."), "");
        assert_eq!(normalize_entry_path("a/./b"), "a/b");
    }

    #[test]
    fn test_category_display() {
        assert_eq!(FormatCategory::Zip.to_string(), "zip");
        assert_eq!(FormatCategory::Compression.to_string(), "compression");
    }
}

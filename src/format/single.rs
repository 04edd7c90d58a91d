//! Single-member compressed files (`.gz`, `.bz2`, `.xz`).
//!
//! Such a container holds exactly one member, named after the container
//! with its compression extension removed. The stream is not seekable, so
//! the member is always decompressed or recompressed as a whole.

use std::io::{self, Write};

use super::{Compression, ContainerKind, EntryInfo, FormatCategory, FormatCodec, ReadSeek, WriteSeek};
use crate::config::Config;
use crate::session::{StagedEntry, Staging};

/// Codec for a stream compression holding one file.
#[derive(Debug, Clone, Copy)]
pub struct SingleFileCodec {
    compression: Compression,
}

impl SingleFileCodec {
    /// Creates a codec for `compression`.
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    /// Returns the compression of the container.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    fn decompress(&self, source: &mut dyn ReadSeek, sink: &mut dyn Write) -> io::Result<u64> {
        source.rewind()?;
        let mut reader = self.compression.reader(source)?;
        io::copy(&mut reader, sink)
    }
}

impl FormatCodec for SingleFileCodec {
    fn name(&self) -> &'static str {
        self.compression.extension().unwrap_or("raw")
    }

    fn category(&self) -> FormatCategory {
        FormatCategory::Compression
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::SingleMember
    }

    fn list_entries(&self, source: &mut dyn ReadSeek, member_name: &str) -> io::Result<Vec<EntryInfo>> {
        // The uncompressed size is only known after decoding the whole stream.
        let size = self.decompress(source, &mut io::sink())?;
        Ok(vec![EntryInfo::file(member_name, size, None)])
    }

    fn extract(&self, source: &mut dyn ReadSeek, _entry: &str, sink: &mut dyn Write) -> io::Result<u64> {
        self.decompress(source, sink)
    }

    fn create_empty(&self, sink: &mut dyn Write, config: &Config) -> io::Result<()> {
        self.compression.writer(sink, config)?.finish()
    }

    fn rebuild(
        &self,
        source: Option<&mut dyn ReadSeek>,
        staging: &mut Staging,
        sink: &mut dyn WriteSeek,
        config: &Config,
    ) -> io::Result<()> {
        let mut writer = self.compression.writer(sink, config)?;
        let staged = staging.entries().find_map(|(_, entry)| match entry {
            StagedEntry::File { data, .. } => Some(data),
            StagedEntry::Directory { .. } => None,
        });
        match (staged, source) {
            (Some(data), _) => {
                data.copy_to(&mut writer)?;
            }
            (None, Some(source)) => {
                self.decompress(source, &mut writer)?;
            }
            (None, None) => {}
        }
        writer.finish()
    }
}

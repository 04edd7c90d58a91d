//! Tar containers, plain or wrapped in a stream compression.

use std::collections::HashSet;
use std::io::{self, Read, Seek, Write};

use tar::{Archive, Builder, EntryType, Header};

use super::{
    Compression, ContainerKind, EntryInfo, FormatCategory, FormatCodec, ReadSeek, WriteSeek,
    normalize_entry_path,
};
use crate::config::Config;
use crate::session::{StagedEntry, Staging};
use crate::timestamp::{from_unix_secs, unix_secs};

/// Codec for tar archives.
///
/// Regular files and directories are exposed as members. Links and special
/// files are not listed but are carried over unchanged on rebuild.
#[derive(Debug, Clone, Copy)]
pub struct TarCodec {
    compression: Compression,
}

impl TarCodec {
    /// Creates a tar codec with the given outer compression.
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    /// Returns the outer compression.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    fn open<'a>(&self, source: &'a mut dyn ReadSeek) -> io::Result<Archive<Box<dyn Read + 'a>>> {
        source.rewind()?;
        Ok(Archive::new(self.compression.reader(source)?))
    }
}

fn is_file(entry_type: EntryType) -> bool {
    matches!(
        entry_type,
        EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse
    )
}

fn is_metadata(entry_type: EntryType) -> bool {
    matches!(
        entry_type,
        EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName | EntryType::GNULongLink
    )
}

impl FormatCodec for TarCodec {
    fn name(&self) -> &'static str {
        match self.compression {
            Compression::None => "tar",
            Compression::Gzip => "tar.gz",
            Compression::Bzip2 => "tar.bz2",
            Compression::Xz => "tar.xz",
        }
    }

    fn category(&self) -> FormatCategory {
        FormatCategory::Tar
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::MultiMember
    }

    fn list_entries(&self, source: &mut dyn ReadSeek, _member_name: &str) -> io::Result<Vec<EntryInfo>> {
        let mut archive = self.open(source)?;
        let mut entries = Vec::new();
        for entry in archive.entries()? {
            let entry = entry?;
            let header = entry.header();
            let entry_type = header.entry_type();
            let path = normalize_entry_path(&String::from_utf8_lossy(&entry.path_bytes()));
            if path.is_empty() {
                continue;
            }
            let modified = header.mtime().ok().map(from_unix_secs);
            if entry_type.is_dir() {
                entries.push(EntryInfo::directory(path, modified));
            } else if is_file(entry_type) {
                entries.push(EntryInfo::file(path, entry.size(), modified));
            }
        }
        Ok(entries)
    }

    fn extract(&self, source: &mut dyn ReadSeek, entry: &str, sink: &mut dyn Write) -> io::Result<u64> {
        let mut archive = self.open(source)?;
        for member in archive.entries()? {
            let mut member = member?;
            if !is_file(member.header().entry_type()) {
                continue;
            }
            let path = normalize_entry_path(&String::from_utf8_lossy(&member.path_bytes()));
            if path == entry {
                return io::copy(&mut member, sink);
            }
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no member '{}' in tar archive", entry),
        ))
    }

    fn create_empty(&self, sink: &mut dyn Write, config: &Config) -> io::Result<()> {
        let mut builder = Builder::new(self.compression.writer(sink, config)?);
        builder.finish()?;
        builder.into_inner()?.finish()
    }

    fn rebuild(
        &self,
        source: Option<&mut dyn ReadSeek>,
        staging: &mut Staging,
        sink: &mut dyn WriteSeek,
        config: &Config,
    ) -> io::Result<()> {
        let mut builder = Builder::new(self.compression.writer(sink, config)?);
        let mut kept = 0usize;

        if let Some(source) = source {
            let mut archive = self.open(source)?;
            let mut seen = HashSet::new();
            for member in archive.entries()? {
                let mut member = member?;
                let entry_type = member.header().entry_type();
                if is_metadata(entry_type) {
                    continue;
                }
                let raw_path = String::from_utf8_lossy(&member.path_bytes()).into_owned();
                let path = normalize_entry_path(&raw_path);
                if path.is_empty() || staging.is_dropped(&path) || !seen.insert(path.clone()) {
                    continue;
                }
                let mut header = member.header().clone();
                if entry_type.is_symlink() || entry_type.is_hard_link() {
                    let target = member.link_name()?.map(|t| t.into_owned()).unwrap_or_default();
                    builder.append_link(&mut header, &path, target)?;
                } else {
                    builder.append_data(&mut header, &path, &mut member)?;
                }
                kept += 1;
            }
        }

        for (path, entry) in staging.entries_mut() {
            let mut header = Header::new_gnu();
            header.set_mtime(unix_secs(entry.modified()));
            match entry {
                StagedEntry::File { data, .. } => {
                    header.set_entry_type(EntryType::Regular);
                    header.set_size(data.len()?);
                    header.set_mode(0o644);
                    data.rewind()?;
                    builder.append_data(&mut header, path, &mut *data)?;
                }
                StagedEntry::Directory { .. } => {
                    header.set_entry_type(EntryType::Directory);
                    header.set_size(0);
                    header.set_mode(0o755);
                    builder.append_data(&mut header, path, io::empty())?;
                }
            }
        }

        builder.finish()?;
        builder.into_inner()?.finish()?;
        log::debug!(
            "rebuilt {} archive: {} members kept, {} staged",
            self.name(),
            kept,
            staging.len()
        );
        Ok(())
    }
}

//! Zip containers.
//!
//! Reading and writing go through the `zip` crate. On rebuild, members that
//! are carried over unchanged are copied in their compressed form, so only
//! staged members are compressed again.

use std::collections::HashSet;
use std::io::{self, Cursor, Write};
use std::time::SystemTime;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{ContainerKind, EntryInfo, FormatCategory, FormatCodec, ReadSeek, WriteSeek, normalize_entry_path};
use crate::config::{Config, ZipMethod};
use crate::session::{StagedEntry, Staging};
use crate::timestamp::DosDateTime;

/// Codec for zip and zip-based formats (jar, war, ear, apk).
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipCodec;

impl ZipCodec {
    /// Creates a zip codec.
    pub fn new() -> Self {
        Self
    }
}

fn file_options(config: &Config, modified: SystemTime, large: bool) -> SimpleFileOptions {
    let method = match config.zip_method {
        ZipMethod::Stored => CompressionMethod::Stored,
        ZipMethod::Deflated => CompressionMethod::Deflated,
    };
    SimpleFileOptions::default()
        .compression_method(method)
        .last_modified_time(to_zip_time(modified))
        .large_file(large)
}

fn to_zip_time(time: SystemTime) -> zip::DateTime {
    let dos = DosDateTime::from_system_time(time);
    zip::DateTime::from_date_and_time(dos.year, dos.month, dos.day, dos.hour, dos.minute, dos.second)
        .unwrap_or_default()
}

fn from_zip_time(time: zip::DateTime) -> SystemTime {
    DosDateTime {
        year: time.year(),
        month: time.month(),
        day: time.day(),
        hour: time.hour(),
        minute: time.minute(),
        second: time.second(),
    }
    .to_system_time()
}

impl FormatCodec for ZipCodec {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn category(&self) -> FormatCategory {
        FormatCategory::Zip
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::MultiMember
    }

    fn list_entries(&self, source: &mut dyn ReadSeek, _member_name: &str) -> io::Result<Vec<EntryInfo>> {
        let mut archive = ZipArchive::new(source)?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive.by_index_raw(index)?;
            let path = normalize_entry_path(file.name());
            if path.is_empty() {
                continue;
            }
            let modified = file.last_modified().map(from_zip_time);
            if file.is_dir() {
                entries.push(EntryInfo::directory(path, modified));
            } else {
                entries.push(EntryInfo::file(path, file.size(), modified));
            }
        }
        Ok(entries)
    }

    fn extract(&self, source: &mut dyn ReadSeek, entry: &str, sink: &mut dyn Write) -> io::Result<u64> {
        let mut archive = ZipArchive::new(source)?;
        let mut found = None;
        for index in 0..archive.len() {
            let file = archive.by_index_raw(index)?;
            if !file.is_dir() && normalize_entry_path(file.name()) == entry {
                found = Some(index);
            }
        }
        let Some(index) = found else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no member '{}' in zip archive", entry),
            ));
        };
        let mut file = archive.by_index(index)?;
        io::copy(&mut file, sink)
    }

    fn create_empty(&self, sink: &mut dyn Write, _config: &Config) -> io::Result<()> {
        let writer = ZipWriter::new(Cursor::new(Vec::new()));
        let bytes = writer.finish()?.into_inner();
        sink.write_all(&bytes)
    }

    fn rebuild(
        &self,
        source: Option<&mut dyn ReadSeek>,
        staging: &mut Staging,
        sink: &mut dyn WriteSeek,
        config: &Config,
    ) -> io::Result<()> {
        let mut writer = ZipWriter::new(sink);
        let mut kept = 0usize;

        if let Some(source) = source {
            let mut archive = ZipArchive::new(source)?;
            let mut seen = HashSet::new();
            for index in 0..archive.len() {
                let file = archive.by_index_raw(index)?;
                let path = normalize_entry_path(file.name());
                if path.is_empty() || staging.is_dropped(&path) || !seen.insert(path) {
                    continue;
                }
                writer.raw_copy_file(file)?;
                kept += 1;
            }
        }

        for (path, entry) in staging.entries_mut() {
            match entry {
                StagedEntry::File { data, modified } => {
                    let large = data.len()? >= u64::from(u32::MAX);
                    writer.start_file(path.as_str(), file_options(config, *modified, large))?;
                    data.copy_to(&mut writer)?;
                }
                StagedEntry::Directory { modified } => {
                    writer.add_directory(format!("{}/", path), file_options(config, *modified, false))?;
                }
            }
        }

        writer.finish()?;
        log::debug!("rebuilt zip archive: {} members kept, {} staged", kept, staging.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferedStream;
    use crate::timestamp::from_unix_secs;

    fn build(staging: &mut Staging, source: Option<Vec<u8>>) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        let mut source = source.map(Cursor::new);
        ZipCodec
            .rebuild(
                source.as_mut().map(|s| s as &mut dyn ReadSeek),
                staging,
                &mut out,
                &Config::default(),
            )
            .unwrap();
        out.into_inner()
    }

    fn staged_file(staging: &mut Staging, path: &str, data: &[u8]) {
        let stream = BufferedStream::from_bytes(data, &Config::default()).unwrap();
        staging.stage_file(path.to_string(), stream, from_unix_secs(1_700_000_000));
    }

    #[test]
    fn test_empty_archive_lists_nothing() {
        let mut bytes = Vec::new();
        ZipCodec.create_empty(&mut bytes, &Config::default()).unwrap();
        let entries = ZipCodec.list_entries(&mut Cursor::new(bytes), "").unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_rebuild_merges_staged_and_original() {
        let mut staging = Staging::new();
        staged_file(&mut staging, "keep.txt", b"keep");
        staged_file(&mut staging, "drop.txt", b"drop");
        staging.stage_dir("dir".into(), from_unix_secs(1_700_000_000));
        let first = build(&mut staging, None);

        let mut staging = Staging::new();
        staging.delete("drop.txt");
        staged_file(&mut staging, "dir/new.txt", b"new");
        let second = build(&mut staging, Some(first));

        let mut source = Cursor::new(second);
        let mut names: Vec<_> = ZipCodec
            .list_entries(&mut source, "")
            .unwrap()
            .into_iter()
            .map(|e| (e.path, e.is_dir))
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                ("dir".to_string(), true),
                ("dir/new.txt".to_string(), false),
                ("keep.txt".to_string(), false),
            ]
        );

        let mut out = Vec::new();
        ZipCodec.extract(&mut source, "keep.txt", &mut out).unwrap();
        assert_eq!(out, b"keep");
    }

    #[test]
    fn test_modified_time_round_trips() {
        let mut staging = Staging::new();
        staged_file(&mut staging, "t.txt", b"t");
        let bytes = build(&mut staging, None);
        let entries = ZipCodec.list_entries(&mut Cursor::new(bytes), "").unwrap();
        assert_eq!(entries[0].modified, Some(from_unix_secs(1_700_000_000)));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let mut source = Cursor::new(b"this is not a zip archive".to_vec());
        assert!(ZipCodec.list_entries(&mut source, "").is_err());
    }

    #[test]
    fn test_extract_missing_member() {
        let mut bytes = Vec::new();
        ZipCodec.create_empty(&mut bytes, &Config::default()).unwrap();
        let err = ZipCodec
            .extract(&mut Cursor::new(bytes), "nope", &mut io::sink())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}

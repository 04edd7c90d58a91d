//! Filesystem-style access to files on disk and inside archives.
//!
//! [`ArchiveFs`] accepts virtual paths in which container files act as
//! directories, to any depth:
//!
//! ```rust,no_run
//! use arcfs::ArchiveFs;
//!
//! let fs = ArchiveFs::new();
//! fs.write("backup.zip/configs/app.toml", b"port = 8080")?;
//! fs.write("backup.zip/nested/logs.tar.gz/today.log", b"started")?;
//!
//! assert_eq!(fs.list_dir("backup.zip")?, vec!["configs", "nested"]);
//! assert!(fs.is_dir("backup.zip/nested/logs.tar.gz")?);
//! assert_eq!(fs.read("backup.zip/nested/logs.tar.gz/today.log")?, b"started");
//! # Ok::<(), arcfs::Error>(())
//! ```
//!
//! Every mutating call is committed before it returns: the containers on
//! the path are rebuilt from the innermost outwards and the outermost one
//! atomically replaces its file on disk. A failed call leaves the file on
//! disk unchanged.
//!
//! # Path Handling
//!
//! Paths use `/` as separator; `\` is accepted and normalized. A directory
//! on disk whose name looks like an archive (`exports.zip/`) stays a plain
//! directory. Inside an archive, `.` components are ignored and `..` is
//! rejected with [`Error::InvalidPath`].

mod file;
mod location;
mod walk;

pub use file::{OpenMode, VfsFile};
pub use walk::{Walk, WalkEntry, glob_match};

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use filetime::FileTime;

use crate::buffer::Encoding;
use crate::config::{self, Config};
use crate::format::{ContainerKind, FormatCodec, FormatRegistry};
use crate::path::{PathResolver, ResolvedPath, join, split_last};
use crate::session::is_same_or_below;
use crate::timestamp::from_file_time;
use crate::{Error, Result};

use location::{Access, Target};

/// Metadata returned by [`ArchiveFs::get_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// The path as given.
    pub path: String,
    /// Size in bytes; 0 for directories.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Creation time. Members of archives report their modification time.
    pub created: SystemTime,
    /// `true` for directories, on disk or inside an archive.
    pub is_dir: bool,
    /// `true` for container files, which can also be listed as directories.
    pub is_archive: bool,
}

/// Virtual filesystem over plain files and archive contents.
///
/// Cloning is cheap: clones share the format registry. The configuration
/// is captured when the value is created.
#[derive(Debug, Clone)]
pub struct ArchiveFs {
    resolver: PathResolver,
    config: Config,
}

impl Default for ArchiveFs {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a missing container to `missing`.
fn or_missing<T>(result: Result<T>, missing: T) -> Result<T> {
    match result {
        Err(Error::ArchiveNotFound { .. }) => Ok(missing),
        other => other,
    }
}

impl ArchiveFs {
    /// Creates a filesystem using the global registry and configuration.
    pub fn new() -> Self {
        Self::with_config(config::global())
    }

    /// Creates a filesystem using the global registry and `config`.
    pub fn with_config(config: Config) -> Self {
        Self {
            resolver: PathResolver::global(),
            config,
        }
    }

    /// Creates a filesystem with its own registry.
    pub fn with_registry(registry: Arc<FormatRegistry>, config: Config) -> Self {
        Self {
            resolver: PathResolver::new(registry),
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the path resolver.
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Returns the format registry.
    pub fn registry(&self) -> &Arc<FormatRegistry> {
        self.resolver.registry()
    }

    /// Splits `path` at its first archive boundary.
    ///
    /// Unlike [`PathResolver::resolve`], existing directories on disk are
    /// never treated as archives.
    pub fn resolve(&self, path: &str) -> Result<ResolvedPath> {
        self.resolver
            .resolve_with(path, |prefix| Path::new(prefix).is_dir())
    }

    fn target_exists(&self, target: &Target) -> Result<bool> {
        match target {
            Target::Physical(path) => match fs::metadata(path) {
                Ok(_) => Ok(true),
                Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                    Ok(false)
                }
                Err(e) => Err(Error::fs("stat", path, e)),
            },
            Target::Member { chain, entry } => or_missing(
                self.with_session(chain, Access::Read, |session| session.exists(entry)),
                false,
            ),
        }
    }

    /// Returns `true` if `path` exists.
    ///
    /// A missing container on the way is not an error.
    pub fn exists(&self, path: &str) -> Result<bool> {
        self.target_exists(&self.target(path)?)
    }

    /// Returns `true` if `path` is a directory or a container file.
    pub fn is_dir(&self, path: &str) -> Result<bool> {
        let target = self.target(path)?;
        if self.container_of(&target).is_some() {
            return self.target_exists(&target);
        }
        match target {
            Target::Physical(path) => Ok(path.is_dir()),
            Target::Member { chain, entry } => or_missing(
                self.with_session(&chain, Access::Read, |session| session.is_dir(&entry)),
                false,
            ),
        }
    }

    fn is_plain_dir(&self, path: &str) -> Result<bool> {
        let target = self.target(path)?;
        if self.container_of(&target).is_some() {
            return Ok(false);
        }
        self.is_dir(path)
    }

    /// Returns metadata for `path`.
    pub fn get_info(&self, path: &str) -> Result<FileInfo> {
        let target = self.target(path)?;
        let is_archive = self.container_of(&target).is_some();
        match target {
            Target::Physical(physical) => {
                let metadata = fs::metadata(&physical).map_err(|e| Error::fs("stat", &physical, e))?;
                let modified = FileTime::from_last_modification_time(&metadata);
                let created = FileTime::from_creation_time(&metadata).unwrap_or(modified);
                Ok(FileInfo {
                    path: path.to_string(),
                    size: if metadata.is_dir() { 0 } else { metadata.len() },
                    modified: from_file_time(modified),
                    created: from_file_time(created),
                    is_dir: metadata.is_dir(),
                    is_archive,
                })
            }
            Target::Member { chain, entry } => {
                let info = self.with_session(&chain, Access::Read, |session| session.entry_info(&entry))?;
                let modified = info.modified.unwrap_or_else(SystemTime::now);
                Ok(FileInfo {
                    path: path.to_string(),
                    size: info.size,
                    modified,
                    created: modified,
                    is_dir: info.is_dir,
                    is_archive: is_archive && !info.is_dir,
                })
            }
        }
    }

    /// Opens `path` with an `fopen`-style `mode`; see [`OpenMode`].
    ///
    /// Writes to an archive member reach the archive when the returned
    /// file is closed.
    pub fn open(&self, path: &str, mode: &str) -> Result<VfsFile> {
        VfsFile::open(self, path, OpenMode::parse(mode)?)
    }

    /// Reads the whole content of a file.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        match self.target(path)? {
            Target::Physical(physical) => {
                if physical.is_dir() {
                    return Err(Error::IsADirectory {
                        path: path.to_string(),
                    });
                }
                fs::read(&physical).map_err(|e| Error::fs("read", &physical, e))
            }
            Target::Member { chain, entry } => {
                if entry.is_empty() {
                    return Err(Error::IsADirectory {
                        path: chain.display(),
                    });
                }
                self.with_session(&chain, Access::Read, |session| session.read_entry(&entry)?.to_vec())
            }
        }
    }

    /// Reads a file as UTF-8 text.
    pub fn read_to_string(&self, path: &str) -> Result<String> {
        Encoding::Utf8.decode(self.read(path)?)
    }

    /// Replaces the content of a file, creating it and any missing
    /// containers on the way.
    pub fn write(&self, path: &str, data: impl AsRef<[u8]>) -> Result<()> {
        let data = data.as_ref();
        match self.target(path)? {
            Target::Physical(physical) => {
                if physical.is_dir() {
                    return Err(Error::IsADirectory {
                        path: path.to_string(),
                    });
                }
                fs::write(&physical, data).map_err(|e| Error::fs("write", &physical, e))
            }
            Target::Member { chain, entry } => {
                self.with_session(&chain, Access::CREATE, |session| session.write_entry(&entry, data))
            }
        }
    }

    /// Appends to a file, creating it if missing.
    pub fn append(&self, path: &str, data: impl AsRef<[u8]>) -> Result<()> {
        let data = data.as_ref();
        match self.target(path)? {
            Target::Physical(physical) => {
                let mut file = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&physical)
                    .map_err(|e| Error::fs("open", &physical, e))?;
                file.write_all(data)
                    .map_err(|e| Error::fs("append to", &physical, e))
            }
            Target::Member { chain, entry } => {
                self.with_session(&chain, Access::CREATE, |session| session.append_entry(&entry, data))
            }
        }
    }

    /// Removes a file. Container files count as files.
    ///
    /// # Errors
    ///
    /// [`Error::IsADirectory`] if `path` is a directory.
    pub fn remove(&self, path: &str) -> Result<()> {
        match self.target(path)? {
            Target::Physical(physical) => {
                if physical.is_dir() {
                    return Err(Error::IsADirectory {
                        path: path.to_string(),
                    });
                }
                fs::remove_file(&physical).map_err(|e| Error::fs("remove", &physical, e))
            }
            Target::Member { chain, entry } => {
                if entry.is_empty() {
                    return Err(Error::IsADirectory {
                        path: chain.display(),
                    });
                }
                self.with_session(&chain, Access::MODIFY, |session| session.remove_entry(&entry))
            }
        }
    }

    /// Creates a directory.
    ///
    /// A path naming a container (`new.zip`, `a.zip/inner.tar`) creates an
    /// empty container. With `parents`, missing ancestors are created on
    /// disk and inside archives, missing containers included, and an
    /// existing directory is not an error.
    pub fn mkdir(&self, path: &str, parents: bool) -> Result<()> {
        let target = self.target(path)?;
        if self.container_of(&target).is_some() {
            return self.create_container(path, &target, parents);
        }
        match target {
            Target::Physical(physical) => {
                let result = if parents {
                    fs::create_dir_all(&physical)
                } else {
                    fs::create_dir(&physical)
                };
                match result {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        if parents && physical.is_dir() {
                            Ok(())
                        } else {
                            Err(Error::AlreadyExists {
                                path: path.to_string(),
                            })
                        }
                    }
                    Err(e) => Err(Error::fs("create directory", &physical, e)),
                }
            }
            Target::Member { chain, entry } => self.with_session(
                &chain,
                Access::Write {
                    create: parents,
                    parents,
                },
                |session| session.create_dir(&entry, parents),
            ),
        }
    }

    fn create_container(&self, path: &str, target: &Target, parents: bool) -> Result<()> {
        if self.target_exists(target)? {
            return if parents && self.is_dir(path)? {
                Ok(())
            } else {
                Err(Error::AlreadyExists {
                    path: target.display(),
                })
            };
        }
        if !parents {
            let display = target.display();
            let (parent, _) = split_last(&display);
            if !parent.is_empty() && !self.is_dir(parent)? {
                return Err(Error::NotFound {
                    path: parent.to_string(),
                });
            }
        }

        let Some(chain) = self.container_of(target) else {
            return Err(Error::UnsupportedFormat {
                path: target.display(),
            });
        };
        log::debug!("creating empty container '{}'", chain.display());
        self.with_session(&chain, Access::Write { create: true, parents }, |session| {
            session.touch();
            Ok(())
        })
    }

    /// Removes a directory.
    ///
    /// Removing a container path deletes the container; without
    /// `recursive` it must be empty.
    ///
    /// # Errors
    ///
    /// - [`Error::NotADirectory`] if `path` is a plain file
    /// - [`Error::DirectoryNotEmpty`] if it has children and `recursive` is `false`
    pub fn rmdir(&self, path: &str, recursive: bool) -> Result<()> {
        let target = self.target(path)?;
        if let Some(chain) = self.container_of(&target) {
            if !recursive {
                let children = self.with_session(&chain, Access::Read, |session| session.list_dir(""))?;
                if !children.is_empty() {
                    return Err(Error::DirectoryNotEmpty {
                        path: target.display(),
                    });
                }
            }
            log::debug!("removing container '{}'", target.display());
            return match target {
                Target::Physical(physical) => {
                    fs::remove_file(&physical).map_err(|e| Error::fs("remove", &physical, e))
                }
                Target::Member { chain, entry } => {
                    self.with_session(&chain, Access::MODIFY, |session| session.remove_entry(&entry))
                }
            };
        }

        match target {
            Target::Physical(physical) => {
                let metadata = fs::metadata(&physical).map_err(|e| Error::fs("stat", &physical, e))?;
                if !metadata.is_dir() {
                    return Err(Error::NotADirectory {
                        path: path.to_string(),
                    });
                }
                if recursive {
                    return fs::remove_dir_all(&physical)
                        .map_err(|e| Error::fs("remove directory", &physical, e));
                }
                let mut entries =
                    fs::read_dir(&physical).map_err(|e| Error::fs("read directory", &physical, e))?;
                if entries.next().is_some() {
                    return Err(Error::DirectoryNotEmpty {
                        path: path.to_string(),
                    });
                }
                fs::remove_dir(&physical).map_err(|e| Error::fs("remove directory", &physical, e))
            }
            Target::Member { chain, entry } => self.with_session(&chain, Access::MODIFY, |session| {
                session.remove_dir(&entry, recursive)
            }),
        }
    }

    /// Returns the sorted names directly below `path`.
    ///
    /// Container files list their top-level members.
    pub fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        Ok(self
            .read_dir_entries(path)?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// Children of `path` with whether each is a directory, sorted by name.
    pub(crate) fn read_dir_entries(&self, path: &str) -> Result<Vec<(String, bool)>> {
        let target = self.target(path)?;
        if let Some(chain) = self.container_of(&target) {
            return self.with_session(&chain, Access::Read, |session| session.list_children(""));
        }
        match target {
            Target::Physical(physical) => {
                let metadata = fs::metadata(&physical).map_err(|e| Error::fs("stat", &physical, e))?;
                if !metadata.is_dir() {
                    return Err(Error::NotADirectory {
                        path: path.to_string(),
                    });
                }
                let mut children = Vec::new();
                for entry in fs::read_dir(&physical).map_err(|e| Error::fs("read directory", &physical, e))? {
                    let entry = entry.map_err(|e| Error::fs("read directory", &physical, e))?;
                    let name = entry.file_name().to_string_lossy().into_owned();
                    children.push((name, entry.path().is_dir()));
                }
                children.sort();
                Ok(children)
            }
            Target::Member { chain, entry } => {
                self.with_session(&chain, Access::Read, |session| session.list_children(&entry))
            }
        }
    }

    /// Copies a file or directory tree.
    ///
    /// Works between any two locations: plain files, archive members and
    /// containers of different formats. A container copied to a name of
    /// the same format, or to a non-archive name, is copied as bytes;
    /// otherwise its members are rewritten into a new container of the
    /// destination's format. If `dst` is an existing directory, the copy is
    /// placed inside it under the name of `src`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPath`] when copying a directory into itself
    /// - [`Error::UnsupportedOperation`] when more than one member would go
    ///   into a single-member container
    pub fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let dst = if self.is_plain_dir(dst)? {
            let (_, name) = split_last(src);
            join(dst, [name])
        } else {
            dst.to_string()
        };
        self.copy_into(src, &dst)
    }

    fn copy_into(&self, src: &str, dst: &str) -> Result<()> {
        let info = self.get_info(src)?;
        if !info.is_dir && !(info.is_archive && self.needs_transcode(src, dst)?) {
            log::trace!("copying '{}' to '{}'", src, dst);
            let mut reader = self.open(src, "rb")?;
            let mut writer = self.open(dst, "wb")?;
            io::copy(&mut reader, &mut writer)?;
            writer.close()?;
            return reader.close();
        }

        let from = self.target(src)?.display();
        let to = self.target(dst)?.display();
        if is_same_or_below(&to, &from) {
            return Err(Error::InvalidPath(format!(
                "cannot copy '{}' into itself at '{}'",
                src, dst
            )));
        }

        let children = self.read_dir_entries(src)?;
        let single_member = self.single_member_name(dst)?;
        if single_member.is_some() && children.len() > 1 {
            return Err(Error::UnsupportedOperation {
                operation: "copying several members",
                path: dst.to_string(),
            });
        }
        if info.is_archive {
            log::debug!("converting '{}' into '{}'", src, dst);
        }
        self.mkdir(dst, true)?;
        for (name, _) in children {
            let member = single_member.as_deref().unwrap_or(&name);
            self.copy_into(&join(src, [&name]), &join(dst, [member]))?;
        }
        Ok(())
    }

    /// Codec of the container named by `path`, if it names one.
    fn container_codec(&self, path: &str) -> Result<Option<Arc<dyn FormatCodec>>> {
        let target = self.target(path)?;
        if self.container_of(&target).is_none() {
            return Ok(None);
        }
        let display = target.display();
        let (_, name) = split_last(&display);
        Ok(self.registry().lookup(name))
    }

    /// Returns `true` if the container `src` cannot be copied to `dst` as
    /// bytes because `dst` names a container of another format.
    fn needs_transcode(&self, src: &str, dst: &str) -> Result<bool> {
        Ok(match (self.container_codec(src)?, self.container_codec(dst)?) {
            (_, None) => false,
            (Some(from), Some(to)) => !Arc::ptr_eq(&from, &to),
            (None, Some(_)) => true,
        })
    }

    /// Member name of `path` if it names a single-member container.
    fn single_member_name(&self, path: &str) -> Result<Option<String>> {
        Ok(self
            .container_codec(path)?
            .filter(|codec| codec.kind() == ContainerKind::SingleMember)
            .map(|_| {
                let (_, name) = split_last(path);
                self.resolver.base_name(name).to_string()
            }))
    }

    /// Moves a file or directory tree.
    ///
    /// Moves between two plain paths use a rename when possible, unless a
    /// container would change format; anything else is a
    /// [`copy`](Self::copy) followed by removal of `src`.
    pub fn move_path(&self, src: &str, dst: &str) -> Result<()> {
        if let (Target::Physical(from), Target::Physical(to)) = (self.target(src)?, self.target(dst)?) {
            let to = match from.file_name() {
                Some(name) if to.is_dir() => to.join(name),
                _ => to,
            };
            let converts = self.get_info(src)?.is_archive
                && self.needs_transcode(src, &to.display().to_string())?;
            if !converts {
                match fs::rename(&from, &to) {
                    Ok(()) => return Ok(()),
                    Err(e) => log::debug!(
                        "rename of '{}' failed, copying instead: {}",
                        from.display(),
                        e
                    ),
                }
            }
        }

        let is_dir = self.get_info(src)?.is_dir;
        self.copy(src, dst)?;
        if is_dir {
            self.rmdir(src, true)
        } else {
            self.remove(src)
        }
    }
}

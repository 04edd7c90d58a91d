//! Staged editing of a single container.
//!
//! An [`ArchiveSession`] owns the current bytes of one container (a
//! physical file, or a member of an enclosing container) together with a
//! [`Staging`] area. Reads see the staged changes layered over the source
//! members; nothing is written until the session is committed, at which
//! point the codec rebuilds the whole container exactly once.
//!
//! Committing consumes the session, so a session cannot be committed
//! twice. Dropping a session without committing discards its changes.
//!
//! # Example
//!
//! ```rust
//! use arcfs::format::ZipCodec;
//! use arcfs::session::ArchiveSession;
//! use arcfs::Config;
//! use std::io::Cursor;
//! use std::sync::Arc;
//! use std::time::SystemTime;
//!
//! let mut session = ArchiveSession::open(
//!     Arc::new(ZipCodec::new()),
//!     None,
//!     "notes.zip",
//!     SystemTime::now(),
//!     Config::default(),
//! );
//! session.write_entry("todo/today.txt", b"write docs")?;
//! assert_eq!(session.list_dir("")?, vec!["todo"]);
//!
//! let mut bytes = Cursor::new(Vec::new());
//! session.apply(&mut bytes)?;
//! # Ok::<(), arcfs::Error>(())
//! ```

mod staging;

pub use staging::{StagedEntry, Staging};

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use crate::buffer::BufferedStream;
use crate::config::Config;
use crate::format::{ContainerKind, EntryInfo, FormatCodec, ReadSeek, WriteSeek, normalize_entry_path};
use crate::{Error, Result};

pub(crate) use staging::is_same_or_below;

/// Converts a codec failure while reading a container into a crate error.
///
/// Crate errors tunnelled through `io::Error` are passed through; anything
/// else means the container could not be parsed.
fn codec_error(name: &str, err: io::Error) -> Error {
    match Error::from(err) {
        Error::Io(source) => Error::CorruptArchive {
            path: name.to_string(),
            source,
        },
        other => other,
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    is_dir: bool,
    size: u64,
    modified: SystemTime,
}

impl Node {
    fn dir(modified: SystemTime) -> Self {
        Self {
            is_dir: true,
            size: 0,
            modified,
        }
    }
}

/// Pending edits to one container.
pub struct ArchiveSession {
    codec: Arc<dyn FormatCodec>,
    source: Option<Box<dyn ReadSeek + Send>>,
    name: String,
    member_name: String,
    container_modified: SystemTime,
    config: Config,
    index: Option<Vec<EntryInfo>>,
    staging: Staging,
    modified: bool,
    removes_container: bool,
}

impl std::fmt::Debug for ArchiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveSession")
            .field("name", &self.name)
            .field("codec", &self.codec.name())
            .field("exists", &self.source.is_some())
            .field("modified", &self.modified)
            .finish_non_exhaustive()
    }
}

impl ArchiveSession {
    /// Opens a session over `source`.
    ///
    /// `source` holds the current container bytes, or `None` if the
    /// container does not exist yet. `name` is the virtual path of the
    /// container and appears in error messages. `modified` is reported for
    /// members that carry no timestamp of their own.
    pub fn open(
        codec: Arc<dyn FormatCodec>,
        source: Option<Box<dyn ReadSeek + Send>>,
        name: impl Into<String>,
        modified: SystemTime,
        config: Config,
    ) -> Self {
        let name = name.into();
        let member_name = default_member_name(&name, codec.name());
        log::debug!(
            "opening {} session for '{}'{}",
            codec.name(),
            name,
            if source.is_none() { " (new container)" } else { "" }
        );
        Self {
            codec,
            source,
            name,
            member_name,
            container_modified: modified,
            config,
            index: None,
            staging: Staging::new(),
            modified: false,
            removes_container: false,
        }
    }

    /// Sets the name of the only member of a single-member container.
    ///
    /// Defaults to the container name without the codec's extension.
    pub fn with_member_name(mut self, member_name: impl Into<String>) -> Self {
        self.member_name = member_name.into();
        self
    }

    /// Returns the virtual path of the container.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the codec of the container.
    pub fn codec(&self) -> &Arc<dyn FormatCodec> {
        &self.codec
    }

    /// Returns the member name used for single-member containers.
    pub fn member_name(&self) -> &str {
        &self.member_name
    }

    /// Returns `true` if the container did not exist when the session opened.
    pub fn is_new(&self) -> bool {
        self.source.is_none()
    }

    /// Returns `true` if committing would change the container.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Returns `true` if committing removes the container instead of
    /// rebuilding it.
    ///
    /// This happens when the only member of a single-member container is
    /// removed.
    pub fn removes_container(&self) -> bool {
        self.removes_container
    }

    fn is_single_member(&self) -> bool {
        self.codec.kind() == ContainerKind::SingleMember
    }

    fn full_path(&self, key: &str) -> String {
        if key.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.name, key)
        }
    }

    fn key(&self, path: &str) -> Result<String> {
        let key = normalize_entry_path(path);
        if key.split('/').any(|segment| segment == "..") {
            return Err(Error::InvalidPath(format!(
                "'{}' points outside the archive",
                self.full_path(path)
            )));
        }
        Ok(key)
    }

    fn load_index(&mut self) -> Result<()> {
        if self.index.is_some() {
            return Ok(());
        }
        let entries = match self.source.as_mut() {
            Some(source) => {
                source.rewind().map_err(|e| codec_error(&self.name, e))?;
                self.codec
                    .list_entries(&mut **source, &self.member_name)
                    .map_err(|e| codec_error(&self.name, e))?
            }
            None => Vec::new(),
        };
        log::trace!("indexed {} members of '{}'", entries.len(), self.name);
        self.index = Some(entries);
        Ok(())
    }

    fn indexed(&self) -> &[EntryInfo] {
        self.index.as_deref().unwrap_or(&[])
    }

    fn node(&mut self, key: &str) -> Result<Option<Node>> {
        if key.is_empty() {
            return Ok(Some(Node::dir(self.container_modified)));
        }
        self.load_index()?;

        if let Some(staged) = self.staging.get(key) {
            return Ok(Some(match staged {
                StagedEntry::File { data, modified } => Node {
                    is_dir: false,
                    size: data.len()?,
                    modified: *modified,
                },
                StagedEntry::Directory { modified } => Node::dir(*modified),
            }));
        }

        if !self.staging.is_deleted(key) {
            if let Some(entry) = self.indexed().iter().rev().find(|e| e.path == key) {
                return Ok(Some(Node {
                    is_dir: entry.is_dir,
                    size: entry.size,
                    modified: entry.modified.unwrap_or(self.container_modified),
                }));
            }
        }

        if self.has_descendants(key) {
            return Ok(Some(Node::dir(self.container_modified)));
        }
        Ok(None)
    }

    fn has_descendants(&self, key: &str) -> bool {
        let below = |path: &str| path.len() > key.len() && is_same_or_below(path, key);
        self.staging.entries().any(|(path, _)| below(path))
            || self
                .indexed()
                .iter()
                .any(|e| below(&e.path) && !self.staging.is_deleted(&e.path))
    }

    /// Immediate children of `key`, mapped to whether each is a directory.
    fn children(&mut self, key: &str) -> Result<BTreeMap<String, bool>> {
        self.load_index()?;
        let mut children = BTreeMap::new();
        let mut add = |path: &str, is_dir: bool| {
            let rest = if key.is_empty() {
                Some(path)
            } else {
                path.strip_prefix(key).and_then(|rest| rest.strip_prefix('/'))
            };
            match rest.map(|rest| rest.split_once('/')) {
                Some(Some((first, _))) => {
                    children.insert(first.to_string(), true);
                }
                Some(None) => {
                    if let Some(name) = rest.filter(|r| !r.is_empty()) {
                        *children.entry(name.to_string()).or_insert(is_dir) |= is_dir;
                    }
                }
                None => {}
            }
        };
        for entry in self.indexed() {
            if !self.staging.is_dropped(&entry.path) {
                add(&entry.path, entry.is_dir);
            }
        }
        for (path, staged) in self.staging.entries() {
            add(path, staged.is_dir());
        }
        Ok(children)
    }

    fn require_dir(&mut self, key: &str) -> Result<()> {
        match self.node(key)? {
            None => Err(Error::EntryNotFound {
                path: self.full_path(key),
            }),
            Some(node) if !node.is_dir => Err(Error::NotADirectory {
                path: self.full_path(key),
            }),
            Some(_) => Ok(()),
        }
    }

    fn check_ancestors(&mut self, key: &str) -> Result<()> {
        let mut end = 0;
        while let Some(offset) = key[end..].find('/') {
            let ancestor = &key[..end + offset];
            if let Some(node) = self.node(ancestor)? {
                if !node.is_dir {
                    return Err(Error::NotADirectory {
                        path: self.full_path(ancestor),
                    });
                }
            }
            end += offset + 1;
        }
        Ok(())
    }

    /// Keeps the parent of a removed member listable.
    fn keep_parent(&mut self, key: &str) -> Result<()> {
        if let Some((parent, _)) = key.rsplit_once('/') {
            if self.node(parent)?.is_none() {
                self.staging.stage_dir(parent.to_string(), SystemTime::now());
            }
        }
        Ok(())
    }

    /// Returns the names directly below the directory `path`, sorted.
    ///
    /// `""` is the root of the container. Directories that exist only as
    /// the prefix of deeper members are listed too.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] if `path` does not exist and
    /// [`Error::NotADirectory`] if it is a file.
    pub fn list_dir(&mut self, path: &str) -> Result<Vec<String>> {
        Ok(self.list_children(path)?.into_iter().map(|(name, _)| name).collect())
    }

    /// Like [`list_dir`](Self::list_dir), but also reports whether each
    /// child is a directory.
    pub fn list_children(&mut self, path: &str) -> Result<Vec<(String, bool)>> {
        let key = self.key(path)?;
        self.require_dir(&key)?;
        Ok(self.children(&key)?.into_iter().collect())
    }

    /// Returns metadata for `path`.
    ///
    /// The modification time is always set; members without one report the
    /// container's.
    pub fn entry_info(&mut self, path: &str) -> Result<EntryInfo> {
        let key = self.key(path)?;
        match self.node(&key)? {
            Some(node) => Ok(EntryInfo {
                path: key,
                size: node.size,
                modified: Some(node.modified),
                is_dir: node.is_dir,
            }),
            None => Err(Error::EntryNotFound {
                path: self.full_path(&key),
            }),
        }
    }

    /// Returns `true` if `path` names a member or directory.
    pub fn exists(&mut self, path: &str) -> Result<bool> {
        let key = self.key(path)?;
        Ok(self.node(&key)?.is_some())
    }

    /// Returns `true` if `path` names a directory.
    pub fn is_dir(&mut self, path: &str) -> Result<bool> {
        let key = self.key(path)?;
        Ok(self.node(&key)?.is_some_and(|node| node.is_dir))
    }

    /// Returns the content of the file member `path`, positioned at the start.
    ///
    /// Staged content takes priority over the source container.
    pub fn read_entry(&mut self, path: &str) -> Result<BufferedStream> {
        let key = self.key(path)?;
        let display = self.full_path(&key);
        match self.node(&key)? {
            None => return Err(Error::EntryNotFound { path: display }),
            Some(node) if node.is_dir => return Err(Error::IsADirectory { path: display }),
            Some(_) => {}
        }

        let mut out = BufferedStream::with_config(&self.config);
        if let Some(StagedEntry::File { data, .. }) = self.staging.get(&key) {
            data.copy_to(&mut out)?;
        } else {
            let source = self
                .source
                .as_mut()
                .ok_or(Error::EntryNotFound { path: display })?;
            source.rewind().map_err(|e| codec_error(&self.name, e))?;
            self.codec
                .extract(&mut **source, &key, &mut out)
                .map_err(|e| codec_error(&self.name, e))?;
        }
        out.rewind()?;
        Ok(out)
    }

    /// Stages `data` as the new content of `path`.
    pub fn write_entry(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let stream = BufferedStream::from_bytes(data, &self.config)?;
        self.stage_stream(path, stream)
    }

    /// Stages the current content of `path` followed by `data`.
    ///
    /// A missing member is created.
    pub fn append_entry(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let mut stream = match self.read_entry(path) {
            Ok(stream) => stream,
            Err(Error::EntryNotFound { .. }) => BufferedStream::with_config(&self.config),
            Err(e) => return Err(e),
        };
        stream.seek(SeekFrom::End(0))?;
        stream.write_all(data)?;
        self.stage_stream(path, stream)
    }

    /// Stages `stream` as the new content of `path`.
    ///
    /// # Errors
    ///
    /// - [`Error::IsADirectory`] if `path` is a directory
    /// - [`Error::NotADirectory`] if an ancestor of `path` is a file
    /// - [`Error::EntryNotFound`] if the container holds a single member
    ///   with a different name
    pub fn stage_stream(&mut self, path: &str, mut stream: BufferedStream) -> Result<()> {
        let key = self.key(path)?;
        if key.is_empty() {
            return Err(Error::IsADirectory {
                path: self.name.clone(),
            });
        }
        if self.is_single_member() && key != self.member_name {
            return Err(Error::EntryNotFound {
                path: self.full_path(&key),
            });
        }
        if self.node(&key)?.is_some_and(|node| node.is_dir) {
            return Err(Error::IsADirectory {
                path: self.full_path(&key),
            });
        }
        self.check_ancestors(&key)?;

        stream.rewind()?;
        log::trace!("staging write of '{}'", self.full_path(&key));
        self.staging.stage_file(key, stream, SystemTime::now());
        self.modified = true;
        self.removes_container = false;
        Ok(())
    }

    /// Stages a directory.
    ///
    /// With `parents`, missing ancestors are created and an existing
    /// directory is not an error.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedOperation`] for single-member containers.
    pub fn create_dir(&mut self, path: &str, parents: bool) -> Result<()> {
        let key = self.key(path)?;
        if self.is_single_member() {
            return Err(Error::UnsupportedOperation {
                operation: "mkdir",
                path: self.full_path(&key),
            });
        }
        match self.node(&key)? {
            Some(node) if node.is_dir && parents => return Ok(()),
            Some(_) => {
                return Err(Error::AlreadyExists {
                    path: self.full_path(&key),
                });
            }
            None => {}
        }

        if let Some((parent, _)) = key.rsplit_once('/') {
            match self.node(parent)? {
                Some(node) if node.is_dir => {}
                Some(_) => {
                    return Err(Error::NotADirectory {
                        path: self.full_path(parent),
                    });
                }
                None if parents => self.create_dir(parent, true)?,
                None => {
                    return Err(Error::EntryNotFound {
                        path: self.full_path(parent),
                    });
                }
            }
        }

        log::trace!("staging directory '{}'", self.full_path(&key));
        self.staging.stage_dir(key, SystemTime::now());
        self.modified = true;
        Ok(())
    }

    /// Stages removal of the file member `path`.
    ///
    /// Removing the member of a single-member container removes the
    /// container itself on commit.
    pub fn remove_entry(&mut self, path: &str) -> Result<()> {
        let key = self.key(path)?;
        match self.node(&key)? {
            None => {
                return Err(Error::EntryNotFound {
                    path: self.full_path(&key),
                });
            }
            Some(node) if node.is_dir => {
                return Err(Error::IsADirectory {
                    path: self.full_path(&key),
                });
            }
            Some(_) => {}
        }

        self.staging.delete(&key);
        self.modified = true;
        if self.is_single_member() {
            self.removes_container = true;
        } else {
            self.keep_parent(&key)?;
        }
        Ok(())
    }

    /// Stages removal of the directory `path`.
    ///
    /// # Errors
    ///
    /// [`Error::DirectoryNotEmpty`] if the directory has children and
    /// `recursive` is `false`.
    pub fn remove_dir(&mut self, path: &str, recursive: bool) -> Result<()> {
        let key = self.key(path)?;
        if self.is_single_member() {
            return Err(Error::UnsupportedOperation {
                operation: "rmdir",
                path: self.full_path(&key),
            });
        }
        self.require_dir(&key)?;
        if !recursive && !self.children(&key)?.is_empty() {
            return Err(Error::DirectoryNotEmpty {
                path: self.full_path(&key),
            });
        }

        self.staging.delete(&key);
        self.modified = true;
        self.keep_parent(&key)?;
        Ok(())
    }

    /// Marks the session modified so that committing writes the container
    /// even without staged changes.
    ///
    /// Used to materialize an empty container.
    pub fn touch(&mut self) {
        self.modified = true;
    }

    /// Writes the rebuilt container to `sink`.
    ///
    /// The source container is parsed before anything is written, so a
    /// corrupt source fails with [`Error::CorruptArchive`] and leaves `sink`
    /// untouched.
    pub fn apply(mut self, sink: &mut dyn WriteSeek) -> Result<()> {
        self.load_index()?;
        let source = match self.source.as_mut() {
            Some(source) => {
                source.rewind()?;
                Some(&mut **source as &mut dyn ReadSeek)
            }
            None => None,
        };
        self.codec
            .rebuild(source, &mut self.staging, sink, &self.config)?;
        log::debug!(
            "rebuilt {} container '{}' with {} staged entries",
            self.codec.name(),
            self.name,
            self.staging.len()
        );
        Ok(())
    }

    /// Commits the session to the physical file at `path`.
    ///
    /// The new container is written to a temporary file in the same
    /// directory and renamed over `path` only once complete; on failure the
    /// temporary file is removed and `path` is left as it was. Does nothing
    /// if the session is not modified.
    pub fn commit_to_path(self, path: &Path) -> Result<()> {
        if !self.modified {
            return Ok(());
        }
        if self.removes_container {
            drop(self);
            log::debug!("removing emptied container '{}'", path.display());
            return match fs::remove_file(path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(Error::fs("remove", path, e)),
                _ => Ok(()),
            };
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::Builder::new()
            .prefix(".arcfs-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| Error::fs("create temporary file in", dir, e))?;

        match fs::metadata(path) {
            Ok(metadata) => {
                temp.as_file()
                    .set_permissions(metadata.permissions())
                    .map_err(|e| Error::fs("set permissions on", temp.path(), e))?;
            }
            #[cfg(unix)]
            Err(_) => {
                use std::os::unix::fs::PermissionsExt;
                temp.as_file()
                    .set_permissions(fs::Permissions::from_mode(0o644))
                    .map_err(|e| Error::fs("set permissions on", temp.path(), e))?;
            }
            #[cfg(not(unix))]
            Err(_) => {}
        }

        self.apply(temp.as_file_mut())?;
        temp.as_file()
            .sync_all()
            .map_err(|e| Error::fs("sync", temp.path(), e))?;
        temp.persist(path)
            .map_err(|e| Error::fs("replace", path, e.error))?;
        log::debug!("committed '{}'", path.display());
        Ok(())
    }
}

/// Last component of `name` without a trailing `.{extension}`.
fn default_member_name(name: &str, extension: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    let cut = base.len().saturating_sub(extension.len() + 1);
    match base.get(cut..) {
        Some(suffix) if cut > 0 && suffix.eq_ignore_ascii_case(&format!(".{}", extension)) => {
            base[..cut].to_string()
        }
        _ => base.to_string(),
    }
}

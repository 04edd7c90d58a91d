//! Mapping virtual paths onto chains of containers.
//!
//! A path such as `a.zip/b/c.tar.gz/d.txt` becomes a [`Chain`] rooted at the
//! physical file `a.zip` with one nested container `b/c.tar.gz`, plus the
//! entry `d.txt` inside the innermost container. Archive-named segments
//! inside an archive always denote containers; the archive is not probed
//! for a directory of that name.
//!
//! Sessions along a chain are opened outermost first. When the innermost
//! session changes, each container is rebuilt into a buffer and staged into
//! its parent, and only the outermost one touches the disk.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::ArchiveFs;
use crate::buffer::BufferedStream;
use crate::format::{FormatCodec, ReadSeek};
use crate::path::split_last;
use crate::session::ArchiveSession;
use crate::{Error, Result};

type Source = Option<Box<dyn ReadSeek + Send>>;

/// The physical file of a container and the containers nested inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Chain {
    pub(crate) physical: PathBuf,
    pub(crate) nested: Vec<String>,
}

impl Chain {
    pub(crate) fn physical(path: PathBuf) -> Self {
        Self {
            physical: path,
            nested: Vec::new(),
        }
    }

    /// Virtual path of the innermost container.
    pub(crate) fn display(&self) -> String {
        let mut path = self.physical.display().to_string();
        for entry in &self.nested {
            path.push('/');
            path.push_str(entry);
        }
        path
    }
}

/// Where a virtual path points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    /// A path outside any container. The path may name a container file.
    Physical(PathBuf),
    /// A member of the innermost container of `chain`; `""` is its root.
    Member { chain: Chain, entry: String },
}

impl Target {
    pub(crate) fn display(&self) -> String {
        match self {
            Target::Physical(path) => path.display().to_string(),
            Target::Member { chain, entry } if entry.is_empty() => chain.display(),
            Target::Member { chain, entry } => format!("{}/{}", chain.display(), entry),
        }
    }
}

/// How a chain of sessions is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    /// Read only; missing containers fail with [`Error::ArchiveNotFound`].
    Read,
    /// Changes are committed when the operation succeeds.
    Write {
        /// Create missing containers along the chain.
        create: bool,
        /// Create missing physical directories above the outermost container.
        parents: bool,
    },
}

impl Access {
    pub(crate) const MODIFY: Access = Access::Write {
        create: false,
        parents: false,
    };

    pub(crate) const CREATE: Access = Access::Write {
        create: true,
        parents: false,
    };

    fn creates(self) -> bool {
        matches!(self, Access::Write { create: true, .. })
    }
}

impl ArchiveFs {
    /// Splits `path` into a physical path or a member of a container chain.
    pub(crate) fn target(&self, path: &str) -> Result<Target> {
        let resolved = self.resolve(path)?;
        let physical = PathBuf::from(resolved.physical_prefix());
        if resolved.is_physical() {
            return Ok(Target::Physical(physical));
        }

        let segments = resolved.archive_segments();
        let mut nested = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for (index, segment) in segments.iter().enumerate() {
            match segment.as_str() {
                "." => continue,
                ".." => {
                    return Err(Error::InvalidPath(format!(
                        "'{}' points outside the archive",
                        path
                    )));
                }
                _ => {}
            }
            current.push(segment);
            if index + 1 < segments.len() && self.resolver.is_archive_name(segment) {
                nested.push(current.join("/"));
                current.clear();
            }
        }

        Ok(Target::Member {
            chain: Chain { physical, nested },
            entry: current.join("/"),
        })
    }

    /// Returns the chain of the container named by `target`, if it names one.
    ///
    /// Physical directories named like archives are not containers.
    pub(crate) fn container_of(&self, target: &Target) -> Option<Chain> {
        match target {
            Target::Physical(path) => {
                let name = path.file_name()?.to_str()?;
                (self.resolver.is_archive_name(name) && !path.is_dir())
                    .then(|| Chain::physical(path.clone()))
            }
            Target::Member { chain, entry } => {
                let (_, name) = split_last(entry);
                if entry.is_empty() || !self.resolver.is_archive_name(name) {
                    return None;
                }
                let mut chain = chain.clone();
                chain.nested.push(entry.clone());
                Some(chain)
            }
        }
    }

    fn codec_for(&self, name: &str) -> Result<std::sync::Arc<dyn FormatCodec>> {
        self.resolver
            .registry()
            .lookup(name)
            .ok_or_else(|| Error::UnsupportedFormat {
                path: name.to_string(),
            })
    }

    fn open_physical(&self, path: &Path, access: Access) -> Result<ArchiveSession> {
        let display = path.display().to_string();
        let codec = self.codec_for(&display)?;
        let (source, modified): (Source, SystemTime) = match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => {
                return Err(Error::IsADirectory { path: display });
            }
            Ok(metadata) => {
                let file = File::open(path).map_err(|e| Error::fs("open", path, e))?;
                let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());
                (Some(Box::new(file) as Box<dyn ReadSeek + Send>), modified)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => match access {
                Access::Write {
                    create: true,
                    parents,
                } => {
                    if parents {
                        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                            fs::create_dir_all(parent)
                                .map_err(|e| Error::fs("create directory", parent, e))?;
                        }
                    }
                    (None, SystemTime::now())
                }
                _ => return Err(Error::ArchiveNotFound { path: display }),
            },
            Err(e) => return Err(Error::fs("stat", path, e)),
        };

        let (_, name) = split_last(&display);
        let member = self.resolver.base_name(name).to_string();
        Ok(ArchiveSession::open(codec, source, display, modified, self.config.clone())
            .with_member_name(member))
    }

    fn open_nested(&self, outer: &mut ArchiveSession, entry: &str, access: Access) -> Result<ArchiveSession> {
        let display = format!("{}/{}", outer.name(), entry);
        let codec = self.codec_for(&display)?;
        let (source, modified): (Source, SystemTime) = match outer.entry_info(entry) {
            Ok(info) if info.is_dir => return Err(Error::IsADirectory { path: display }),
            Ok(info) => {
                let stream = outer.read_entry(entry)?;
                let modified = info.modified.unwrap_or_else(SystemTime::now);
                (Some(Box::new(stream) as Box<dyn ReadSeek + Send>), modified)
            }
            Err(Error::EntryNotFound { .. }) if access.creates() => (None, SystemTime::now()),
            Err(Error::EntryNotFound { .. }) => return Err(Error::ArchiveNotFound { path: display }),
            Err(e) => return Err(e),
        };

        let (_, name) = split_last(entry);
        let member = self.resolver.base_name(name).to_string();
        Ok(ArchiveSession::open(codec, source, display, modified, self.config.clone())
            .with_member_name(member))
    }

    /// Runs `f` on the session of the innermost container of `chain`.
    ///
    /// With [`Access::Write`], changes are committed through every enclosing
    /// container once `f` succeeds. If `f` fails, nothing is written.
    pub(crate) fn with_session<T, F>(&self, chain: &Chain, access: Access, f: F) -> Result<T>
    where
        F: FnOnce(&mut ArchiveSession) -> Result<T>,
    {
        let mut outers: Vec<(ArchiveSession, String)> = Vec::with_capacity(chain.nested.len());
        let mut current = self.open_physical(&chain.physical, access)?;
        let mut current_entry = String::new();
        for entry in &chain.nested {
            let inner = self.open_nested(&mut current, entry, access)?;
            outers.push((current, current_entry));
            current = inner;
            current_entry = entry.clone();
        }

        let value = f(&mut current)?;
        if access == Access::Read {
            return Ok(value);
        }

        let mut inner = current;
        let mut inner_entry = current_entry;
        while let Some((mut outer, entry)) = outers.pop() {
            if inner.is_modified() {
                if inner.removes_container() {
                    outer.remove_entry(&inner_entry)?;
                } else {
                    let mut buffer = BufferedStream::with_config(&self.config);
                    inner.apply(&mut buffer)?;
                    outer.stage_stream(&inner_entry, buffer)?;
                }
            }
            inner = outer;
            inner_entry = entry;
        }
        inner.commit_to_path(&chain.physical)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn fs() -> ArchiveFs {
        ArchiveFs::with_config(Config::default())
    }

    #[test]
    fn test_target_physical() {
        assert_eq!(
            fs().target("plain/dir/file.txt").unwrap(),
            Target::Physical(PathBuf::from("plain/dir/file.txt"))
        );
    }

    #[test]
    fn test_target_nested_chain() {
        let target = fs().target("a.zip/b/c.tar.gz/d/e.txt").unwrap();
        let Target::Member { chain, entry } = target else {
            panic!("expected a member");
        };
        assert_eq!(chain.physical, PathBuf::from("a.zip"));
        assert_eq!(chain.nested, vec!["b/c.tar.gz".to_string()]);
        assert_eq!(entry, "d/e.txt");
        assert_eq!(chain.display(), "a.zip/b/c.tar.gz");
    }

    #[test]
    fn test_trailing_archive_is_member() {
        let target = fs().target("a.zip/inner.tar").unwrap();
        assert_eq!(target.display(), "a.zip/inner.tar");
        let chain = fs().container_of(&target).unwrap();
        assert_eq!(chain.nested, vec!["inner.tar".to_string()]);
    }

    #[test]
    fn test_parent_segments_rejected() {
        assert!(matches!(fs().target("a.zip/../x"), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_container_of_plain_file() {
        let target = Target::Physical(PathBuf::from("notes.txt"));
        assert!(fs().container_of(&target).is_none());
    }
}

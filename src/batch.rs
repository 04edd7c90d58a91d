//! Grouped mutations and rollback.
//!
//! A [`Batch`] forwards each call to [`ArchiveFs`] and records which
//! container files were touched. Each call still commits on its own;
//! the batch adds bookkeeping, not deferral.
//!
//! [`ArchiveFs::transaction`] adds failure atomicity across several
//! containers by backing them up before the body runs:
//!
//! ```rust,no_run
//! use arcfs::ArchiveFs;
//!
//! let fs = ArchiveFs::new();
//! let result = fs.transaction(&["left.zip", "right.tar"], |fs| {
//!     fs.write("left.zip/state", b"moved")?;
//!     fs.remove("right.tar/state")?;
//!     Ok(())
//! });
//! // On error both archives are back to their state before the call.
//! # result?;
//! # Ok::<(), arcfs::Error>(())
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tempfile::NamedTempFile;

use crate::fs::ArchiveFs;
use crate::path::split_last;
use crate::{Error, Result};

/// A group of mutations issued through one [`ArchiveFs`].
#[derive(Debug)]
pub struct Batch<'a> {
    fs: &'a ArchiveFs,
    touched: BTreeSet<PathBuf>,
}

impl<'a> Batch<'a> {
    /// Returns the filesystem the batch forwards to.
    pub fn fs(&self) -> &'a ArchiveFs {
        self.fs
    }

    fn record(&mut self, path: &str) {
        let Ok(resolved) = self.fs.resolve(path) else {
            return;
        };
        let (_, name) = split_last(resolved.physical_prefix());
        if !resolved.is_physical() || self.fs.resolver().is_archive_name(name) {
            self.touched.insert(PathBuf::from(resolved.physical_prefix()));
        }
    }

    fn track(&mut self, result: Result<()>, paths: &[&str]) -> Result<()> {
        if result.is_ok() {
            for path in paths {
                self.record(path);
            }
        }
        result
    }

    /// See [`ArchiveFs::write`].
    pub fn write(&mut self, path: &str, data: impl AsRef<[u8]>) -> Result<()> {
        let result = self.fs.write(path, data);
        self.track(result, &[path])
    }

    /// See [`ArchiveFs::append`].
    pub fn append(&mut self, path: &str, data: impl AsRef<[u8]>) -> Result<()> {
        let result = self.fs.append(path, data);
        self.track(result, &[path])
    }

    /// See [`ArchiveFs::remove`].
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let result = self.fs.remove(path);
        self.track(result, &[path])
    }

    /// See [`ArchiveFs::mkdir`].
    pub fn mkdir(&mut self, path: &str, parents: bool) -> Result<()> {
        let result = self.fs.mkdir(path, parents);
        self.track(result, &[path])
    }

    /// See [`ArchiveFs::rmdir`].
    pub fn rmdir(&mut self, path: &str, recursive: bool) -> Result<()> {
        let result = self.fs.rmdir(path, recursive);
        self.track(result, &[path])
    }

    /// See [`ArchiveFs::copy`].
    pub fn copy(&mut self, src: &str, dst: &str) -> Result<()> {
        let result = self.fs.copy(src, dst);
        self.track(result, &[dst])
    }

    /// See [`ArchiveFs::move_path`].
    pub fn move_path(&mut self, src: &str, dst: &str) -> Result<()> {
        let result = self.fs.move_path(src, dst);
        self.track(result, &[src, dst])
    }

    /// Returns the container files modified so far, sorted.
    pub fn touched(&self) -> Vec<PathBuf> {
        self.touched.iter().cloned().collect()
    }

    /// Ends the batch and returns the containers it modified.
    pub fn commit(self) -> Vec<PathBuf> {
        log::debug!("batch finished, {} containers touched", self.touched.len());
        self.touched.into_iter().collect()
    }
}

/// State of a physical path before a transaction.
enum Backup {
    Saved { copy: NamedTempFile, modified: FileTime },
    Absent,
    /// Directories are not backed up.
    Untracked,
}

fn back_up(path: &Path) -> Result<Backup> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => return Ok(Backup::Untracked),
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Backup::Absent),
        Err(e) => return Err(Error::fs("stat", path, e)),
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut copy = tempfile::Builder::new()
        .prefix(".arcfs-backup-")
        .tempfile_in(dir)
        .map_err(|e| Error::fs("create backup in", dir, e))?;
    let mut original = File::open(path).map_err(|e| Error::fs("open", path, e))?;
    io::copy(&mut original, copy.as_file_mut()).map_err(|e| Error::fs("back up", path, e))?;
    copy.as_file()
        .set_permissions(metadata.permissions())
        .map_err(|e| Error::fs("set permissions on", copy.path(), e))?;
    copy.as_file()
        .sync_all()
        .map_err(|e| Error::fs("sync", copy.path(), e))?;
    log::trace!("backed up '{}' to '{}'", path.display(), copy.path().display());

    Ok(Backup::Saved {
        copy,
        modified: FileTime::from_last_modification_time(&metadata),
    })
}

fn restore(path: &Path, backup: Backup) -> io::Result<()> {
    match backup {
        Backup::Saved { copy, modified } => {
            copy.persist(path).map_err(|e| e.error)?;
            if let Err(e) = filetime::set_file_mtime(path, modified) {
                log::warn!("failed to restore mtime of '{}': {}", path.display(), e);
            }
            Ok(())
        }
        Backup::Absent => match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        },
        Backup::Untracked => Ok(()),
    }
}

impl ArchiveFs {
    /// Starts a [`Batch`].
    pub fn batch(&self) -> Batch<'_> {
        Batch {
            fs: self,
            touched: BTreeSet::new(),
        }
    }

    /// Runs `body`, restoring the containers of `paths` if it fails.
    ///
    /// The physical file behind each path (the outermost container, or the
    /// path itself outside archives) is copied beside the original first.
    /// On success the copies are deleted. On failure every copy is put
    /// back with its modification time, files that did not exist before
    /// are deleted, and the body's error is returned.
    ///
    /// # Errors
    ///
    /// [`Error::RollbackFailed`] if a file could not be restored; its
    /// `cause` is the body's error.
    pub fn transaction<T, F>(&self, paths: &[&str], body: F) -> Result<T>
    where
        F: FnOnce(&ArchiveFs) -> Result<T>,
    {
        let mut backups = BTreeMap::new();
        for path in paths {
            let physical = PathBuf::from(self.resolve(path)?.physical_prefix());
            if !backups.contains_key(&physical) {
                let backup = back_up(&physical)?;
                backups.insert(physical, backup);
            }
        }
        log::debug!("transaction started over {} paths", backups.len());

        let cause = match body(self) {
            Ok(value) => {
                for (path, backup) in backups {
                    if let Backup::Saved { copy, .. } = backup {
                        if let Err(e) = copy.close() {
                            log::warn!("failed to remove backup of '{}': {}", path.display(), e);
                        }
                    }
                }
                return Ok(value);
            }
            Err(cause) => cause,
        };

        log::debug!("transaction failed, rolling back: {}", cause);
        let mut failure = None;
        for (path, backup) in backups.into_iter().rev() {
            if let Err(e) = restore(&path, backup) {
                log::warn!("failed to restore '{}': {}", path.display(), e);
                failure.get_or_insert((path, e));
            }
        }
        match failure {
            Some((path, source)) => Err(Error::RollbackFailed {
                path: path.display().to_string(),
                source,
                cause: Box::new(cause),
            }),
            None => Err(cause),
        }
    }
}

//! Pending changes to a container.

use std::collections::{BTreeMap, BTreeSet};
use std::time::SystemTime;

use crate::buffer::BufferedStream;

/// A member staged for the next rebuild.
#[derive(Debug)]
pub enum StagedEntry {
    /// File content to write.
    File {
        /// New content of the member.
        data: BufferedStream,
        /// Modification time to record.
        modified: SystemTime,
    },
    /// An explicit directory record.
    Directory {
        /// Modification time to record.
        modified: SystemTime,
    },
}

impl StagedEntry {
    /// Returns `true` for directory records.
    pub fn is_dir(&self) -> bool {
        matches!(self, StagedEntry::Directory { .. })
    }

    /// Returns the modification time to record.
    pub fn modified(&self) -> SystemTime {
        match self {
            StagedEntry::File { modified, .. } | StagedEntry::Directory { modified } => *modified,
        }
    }
}

/// Writes and deletes recorded against a container but not yet applied.
///
/// Paths are normalized member paths. A write replaces any earlier write to
/// the same path, and deleting a path discards staged writes to it and to
/// everything below it.
#[derive(Debug, Default)]
pub struct Staging {
    entries: BTreeMap<String, StagedEntry>,
    deletes: BTreeSet<String>,
}

impl Staging {
    /// Creates an empty staging area.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.deletes.is_empty()
    }

    /// Stages `data` as the content of `path`.
    pub fn stage_file(&mut self, path: String, data: BufferedStream, modified: SystemTime) {
        self.entries.insert(path, StagedEntry::File { data, modified });
    }

    /// Stages an explicit directory record for `path`.
    pub fn stage_dir(&mut self, path: String, modified: SystemTime) {
        self.entries.insert(path, StagedEntry::Directory { modified });
    }

    /// Marks `path` and everything below it as deleted.
    pub fn delete(&mut self, path: &str) {
        self.entries.retain(|staged, _| !is_same_or_below(staged, path));
        self.deletes.insert(path.to_string());
    }

    /// Returns the staged entry for `path`.
    pub fn get(&self, path: &str) -> Option<&StagedEntry> {
        self.entries.get(path)
    }

    /// Returns `true` if `path` was deleted, directly or through an ancestor,
    /// and not written again since.
    pub fn is_deleted(&self, path: &str) -> bool {
        !self.entries.contains_key(path) && self.deleted_by_prefix(path)
    }

    /// Returns `true` if a member of the source container at `path` must not
    /// be carried into the rebuilt container.
    ///
    /// That is the case when it was deleted or when a staged entry replaces it.
    pub fn is_dropped(&self, path: &str) -> bool {
        self.entries.contains_key(path) || self.deleted_by_prefix(path)
    }

    /// Iterates over staged entries in path order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &StagedEntry)> {
        self.entries.iter()
    }

    /// Iterates mutably over staged entries in path order.
    pub fn entries_mut(&mut self) -> impl Iterator<Item = (&String, &mut StagedEntry)> {
        self.entries.iter_mut()
    }

    /// Returns the number of staged entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn deleted_by_prefix(&self, path: &str) -> bool {
        self.deletes.iter().any(|deleted| is_same_or_below(path, deleted))
    }
}

/// Returns `true` if `path` equals `ancestor` or lies below it.
pub(crate) fn is_same_or_below(path: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() {
        return true;
    }
    match path.strip_prefix(ancestor) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

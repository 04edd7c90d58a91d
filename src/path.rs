//! Virtual path resolution.
//!
//! A virtual path is an ordinary `/`-separated path in which any component
//! whose name carries a registered archive extension marks an archive
//! boundary. [`PathResolver::resolve`] splits such a path at the first
//! boundary into the physical container path and the components inside it:
//!
//! ```rust
//! use arcfs::PathResolver;
//!
//! let resolver = PathResolver::global();
//! let resolved = resolver.resolve("/data/outer.zip/dir/inner.tar.gz/file.txt")?;
//!
//! assert_eq!(resolved.physical_prefix(), "/data/outer.zip");
//! assert_eq!(resolved.entry_path(), "dir/inner.tar.gz/file.txt");
//! # Ok::<(), arcfs::Error>(())
//! ```
//!
//! Resolution is purely structural; the only I/O happens in the optional
//! predicate given to [`PathResolver::resolve_with`].

use std::fmt;
use std::sync::Arc;

use crate::format::FormatRegistry;
use crate::{Error, Result};

/// A path split at its first archive boundary.
///
/// If the original path is absolute, the physical prefix is absolute too.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath {
    original: String,
    physical_prefix: String,
    archive_segments: Vec<String>,
}

impl ResolvedPath {
    /// Returns the path as given to the resolver.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Returns the physical part of the path, up to and including the
    /// first container name.
    pub fn physical_prefix(&self) -> &str {
        &self.physical_prefix
    }

    /// Returns the components inside the container.
    pub fn archive_segments(&self) -> &[String] {
        &self.archive_segments
    }

    /// Returns the components inside the container joined with `/`.
    ///
    /// Empty for purely physical paths.
    pub fn entry_path(&self) -> String {
        self.archive_segments.join("/")
    }

    /// Returns `true` if no archive boundary was found inside the path.
    pub fn is_physical(&self) -> bool {
        self.archive_segments.is_empty()
    }

    /// Returns the container itself, or `None` for purely physical paths.
    pub fn parent_archive(&self) -> Option<ResolvedPath> {
        if self.archive_segments.is_empty() {
            return None;
        }
        Some(ResolvedPath {
            original: self.physical_prefix.clone(),
            physical_prefix: self.physical_prefix.clone(),
            archive_segments: Vec::new(),
        })
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.physical_prefix)?;
        for segment in &self.archive_segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// Splits virtual paths using the extensions of a [`FormatRegistry`].
#[derive(Debug, Clone)]
pub struct PathResolver {
    registry: Arc<FormatRegistry>,
}

impl PathResolver {
    /// Creates a resolver over `registry`.
    pub fn new(registry: Arc<FormatRegistry>) -> Self {
        Self { registry }
    }

    /// Creates a resolver over the process-wide registry.
    pub fn global() -> Self {
        Self::new(FormatRegistry::global())
    }

    /// Returns the registry used to recognize container names.
    pub fn registry(&self) -> &Arc<FormatRegistry> {
        &self.registry
    }

    /// Returns `true` if `name` carries a registered archive extension.
    pub fn is_archive_name(&self, name: &str) -> bool {
        self.registry.matching_extension(name).is_some()
    }

    /// Splits `path` at its first archive boundary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if the path is empty or contains a NUL byte.
    pub fn resolve(&self, path: &str) -> Result<ResolvedPath> {
        self.resolve_with(path, |_| false)
    }

    /// Splits `path` at its first archive boundary, skipping candidates for
    /// which `is_physical_dir` returns `true`.
    ///
    /// The predicate receives the physical prefix up to and including the
    /// candidate component. This lets a real directory named like an
    /// archive (`backups.zip/`) be treated as a plain directory.
    pub fn resolve_with<F>(&self, path: &str, is_physical_dir: F) -> Result<ResolvedPath>
    where
        F: Fn(&str) -> bool,
    {
        if path.is_empty() {
            return Err(Error::InvalidPath("empty path".into()));
        }
        if path.contains('\0') {
            return Err(Error::InvalidPath(format!("{:?} contains a NUL byte", path)));
        }

        let normalized = path.replace('\\', "/");
        let absolute = normalized.starts_with('/');
        let components: Vec<&str> = normalized.split('/').filter(|c| !c.is_empty()).collect();

        let mut prefix = if absolute { String::from("/") } else { String::new() };
        for (index, component) in components.iter().enumerate() {
            if !prefix.is_empty() && !prefix.ends_with('/') {
                prefix.push('/');
            }
            prefix.push_str(component);

            if self.is_archive_name(component) && !is_physical_dir(&prefix) {
                let resolved = ResolvedPath {
                    original: path.to_string(),
                    physical_prefix: prefix,
                    archive_segments: components[index + 1..]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                };
                log::trace!(
                    "resolved '{}' to container '{}' entry '{}'",
                    path,
                    resolved.physical_prefix,
                    resolved.entry_path()
                );
                return Ok(resolved);
            }
        }

        Ok(ResolvedPath {
            original: path.to_string(),
            physical_prefix: prefix,
            archive_segments: Vec::new(),
        })
    }

    /// Returns the container of `resolved`, or `None` if it is physical.
    pub fn parent_archive(&self, resolved: &ResolvedPath) -> Option<ResolvedPath> {
        resolved.parent_archive()
    }

    /// Joins path parts, see [`join`].
    pub fn join<I, S>(&self, base: &str, parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        join(base, parts)
    }

    /// Strips the archive extension from a container name.
    ///
    /// This is the member name of single-file compressions:
    /// `report.txt.gz` holds `report.txt`. Names without an archive
    /// extension are returned unchanged.
    pub fn base_name<'a>(&self, name: &'a str) -> &'a str {
        match self.registry.matching_extension(name) {
            Some(ext) if name.len() > ext.len() + 1 => {
                name.get(..name.len() - ext.len() - 1).unwrap_or(name)
            }
            _ => name,
        }
    }
}

/// Joins path parts with `/`.
///
/// An absolute part replaces everything accumulated before it, and empty
/// parts are skipped. Backslashes are normalized to `/`.
///
/// ```rust
/// use arcfs::path::join;
///
/// assert_eq!(join("outer.zip", ["dir", "inner.tar"]), "outer.zip/dir/inner.tar");
/// assert_eq!(join("a/", ["b"]), "a/b");
/// assert_eq!(join("a", ["/abs", "x"]), "/abs/x");
/// ```
pub fn join<I, S>(base: &str, parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result = base.replace('\\', "/");
    for part in parts {
        let part = part.as_ref().replace('\\', "/");
        if part.is_empty() {
            continue;
        }
        if part.starts_with('/') {
            result = part;
            continue;
        }
        if !result.is_empty() && !result.ends_with('/') {
            result.push('/');
        }
        result.push_str(&part);
    }
    result
}

/// Returns the parent of a virtual path and its last component.
pub(crate) fn split_last(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(index) => (&trimmed[..index], &trimmed[index + 1..]),
        None => ("", trimmed),
    }
}

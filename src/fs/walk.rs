//! Directory traversal and glob matching.

use super::ArchiveFs;
use crate::path::join;
use crate::Result;

/// One directory visited by [`Walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Path of the directory, as passed to [`ArchiveFs::walk`] or joined below it.
    pub root: String,
    /// Names of subdirectories and containers, sorted.
    pub dirs: Vec<String>,
    /// Names of other files, sorted.
    pub files: Vec<String>,
}

/// Depth-first, pre-order traversal of a virtual directory tree.
///
/// Container files are descended into as directories, so a walk from a
/// plain directory continues through every archive below it. A directory
/// that cannot be listed is reported as an `Err` item and skipped; the walk
/// continues with its siblings.
///
/// Directories are listed lazily as the iterator advances.
#[derive(Debug, Clone)]
pub struct Walk {
    fs: ArchiveFs,
    start: String,
    stack: Vec<String>,
}

impl Walk {
    pub(crate) fn new(fs: ArchiveFs, start: &str) -> Self {
        Self {
            fs,
            start: start.to_string(),
            stack: vec![start.to_string()],
        }
    }

    /// Returns the path the walk started from.
    pub fn start(&self) -> &str {
        &self.start
    }

    /// Starts the walk over, re-listing everything from the start path.
    pub fn restart(&mut self) {
        self.stack.clear();
        self.stack.push(self.start.clone());
    }
}

impl Iterator for Walk {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let root = self.stack.pop()?;
        let children = match self.fs.read_dir_entries(&root) {
            Ok(children) => children,
            Err(e) => return Some(Err(e)),
        };

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for (name, is_dir) in children {
            if is_dir || self.fs.resolver().is_archive_name(&name) {
                dirs.push(name);
            } else {
                files.push(name);
            }
        }
        self.stack
            .extend(dirs.iter().rev().map(|name| join(&root, [name])));
        Some(Ok(WalkEntry { root, dirs, files }))
    }
}

/// Matches `path` against a shell-style `pattern`.
///
/// `*` matches any run of characters, `/` included; `?` matches exactly
/// one character. Every other character, `.` included, matches itself.
///
/// ```rust
/// use arcfs::fs::glob_match;
///
/// assert!(glob_match("*.txt", "notes.txt"));
/// assert!(glob_match("docs.zip/*.md", "docs.zip/guide/intro.md"));
/// assert!(glob_match("log-?.gz", "log-1.gz"));
/// assert!(!glob_match("*.txt", "notes.txt.bak"));
/// ```
pub fn glob_match(pattern: &str, path: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let path: Vec<char> = path.chars().collect();

    let (mut p, mut s) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while s < path.len() {
        if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, s));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '?' || pattern[p] == path[s]) {
            p += 1;
            s += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            s = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

/// Directory to walk for `pattern`: everything before the first wildcard,
/// cut back to the last `/`.
fn glob_base(pattern: &str) -> &str {
    let first = pattern.find(['*', '?']).unwrap_or(pattern.len());
    match pattern[..first].rfind('/') {
        Some(0) => "/",
        Some(index) => &pattern[..index],
        None => ".",
    }
}

impl ArchiveFs {
    /// Walks the tree below `path`; see [`Walk`].
    pub fn walk(&self, path: &str) -> Walk {
        Walk::new(self.clone(), path)
    }

    /// Returns the sorted paths matching `pattern`.
    ///
    /// The pattern may cross archive boundaries (`backups/*.zip/*.cfg`).
    /// Directories that cannot be listed are skipped. A pattern without
    /// wildcards returns itself if it exists.
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        if !has_wildcard(pattern) {
            return Ok(if self.exists(pattern)? {
                vec![pattern.to_string()]
            } else {
                Vec::new()
            });
        }

        let base = glob_base(pattern);
        let strip_dot = base == "." && !pattern.starts_with("./");
        let mut matches = Vec::new();
        for entry in self.walk(base) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    log::warn!("glob '{}' skipping unreadable directory: {}", pattern, e);
                    continue;
                }
            };
            for name in entry.dirs.iter().chain(&entry.files) {
                let path = join(&entry.root, [name]);
                let candidate = match path.strip_prefix("./") {
                    Some(rest) if strip_dot => rest.to_string(),
                    _ => path,
                };
                if glob_match(pattern, &candidate) {
                    matches.push(candidate);
                }
            }
        }
        matches.sort();
        matches.dedup();
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match_literal() {
        assert!(glob_match("foo.txt", "foo.txt"));
        assert!(!glob_match("foo.txt", "bar.txt"));
        assert!(!glob_match("foo.txt", "fooxtxt"));
    }

    #[test]
    fn test_glob_match_star() {
        assert!(glob_match("*.txt", "foo.txt"));
        assert!(glob_match("*.txt", "foo/bar.txt"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("a*", "ba"));
    }

    #[test]
    fn test_glob_match_question() {
        assert!(glob_match("?.gz", "a.gz"));
        assert!(!glob_match("?.gz", "ab.gz"));
        assert!(!glob_match("?", ""));
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("*.txt"), ".");
        assert_eq!(glob_base("a.zip/*.txt"), "a.zip");
        assert_eq!(glob_base("a.zip/d*/x"), "a.zip");
        assert_eq!(glob_base("/root/*.zip/x"), "/root");
        assert_eq!(glob_base("/*.zip"), "/");
    }
}

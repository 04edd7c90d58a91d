//! File handles returned by [`ArchiveFs::open`].

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::str::FromStr;

use super::ArchiveFs;
use super::location::{Access, Chain, Target};
use crate::buffer::{BufferedStream, Encoding};
use crate::{Error, Result};

/// Parsed form of an `fopen`-style mode string.
///
/// A mode is one of `r`, `w`, `a` or `x`, optionally followed by `+` and
/// by `b` or `t`:
///
/// | Mode | Read | Write | Creates | Truncates |
/// |------|------|-------|---------|-----------|
/// | `r`  | yes  | `+`   | no      | no        |
/// | `w`  | `+`  | yes   | yes     | yes       |
/// | `a`  | `+`  | end   | yes     | no        |
/// | `x`  | `+`  | yes   | must not exist | - |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    /// Reading is allowed.
    pub read: bool,
    /// Writing is allowed.
    pub write: bool,
    /// Every write goes to the end.
    pub append: bool,
    /// Existing content is discarded on open.
    pub truncate: bool,
    /// A missing file is created.
    pub create: bool,
    /// Opening fails if the file exists.
    pub create_new: bool,
    /// Binary mode (`b`); text mode otherwise.
    pub binary: bool,
}

impl OpenMode {
    /// Parses a mode string such as `"rb"`, `"w"` or `"a+"`.
    pub fn parse(mode: &str) -> Result<Self> {
        let invalid = || Error::InvalidMode(mode.to_string());
        let mut chars = mode.chars();
        let mut parsed = match chars.next() {
            Some('r') => Self::flags(true, false),
            Some('w') => Self {
                truncate: true,
                create: true,
                ..Self::flags(false, true)
            },
            Some('a') => Self {
                append: true,
                create: true,
                ..Self::flags(false, true)
            },
            Some('x') => Self {
                create: true,
                create_new: true,
                ..Self::flags(false, true)
            },
            _ => return Err(invalid()),
        };

        let mut plus = false;
        let mut qualifier = false;
        for c in chars {
            match c {
                '+' if !plus && !qualifier => {
                    plus = true;
                    parsed.read = true;
                    parsed.write = true;
                }
                'b' | 't' if !qualifier => {
                    qualifier = true;
                    parsed.binary = c == 'b';
                }
                _ => return Err(invalid()),
            }
        }
        Ok(parsed)
    }

    fn flags(read: bool, write: bool) -> Self {
        Self {
            read,
            write,
            append: false,
            truncate: false,
            create: false,
            create_new: false,
            binary: false,
        }
    }

    /// Returns `true` if the mode allows writing.
    pub fn is_writable(&self) -> bool {
        self.write
    }

    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.read)
            .write(self.write && !self.append)
            .append(self.append)
            .truncate(self.truncate)
            .create(self.create && !self.create_new)
            .create_new(self.create_new);
        options
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(mode: &str) -> Result<Self> {
        Self::parse(mode)
    }
}

enum Inner {
    Physical(File),
    Member {
        fs: ArchiveFs,
        chain: Chain,
        entry: String,
        stream: Option<BufferedStream>,
        dirty: bool,
    },
}

/// An open file, either on disk or inside a container.
///
/// Members are loaded into a [`BufferedStream`] when opened. Changes are
/// written back into the container by [`close`](Self::close); dropping an
/// unclosed file closes it and logs a warning if that fails.
pub struct VfsFile {
    inner: Inner,
    path: String,
    mode: OpenMode,
    encoding: Encoding,
    closed: bool,
}

impl fmt::Debug for VfsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VfsFile")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl VfsFile {
    pub(crate) fn open(fs: &ArchiveFs, path: &str, mode: OpenMode) -> Result<Self> {
        let inner = match fs.target(path)? {
            Target::Physical(physical) => Inner::Physical(open_physical(&physical, mode)?),
            Target::Member { chain, entry } => {
                if entry.is_empty() {
                    return Err(Error::IsADirectory {
                        path: chain.display(),
                    });
                }
                let mut stream = load_member(fs, &chain, &entry, mode)?;
                if mode.append {
                    stream.seek(SeekFrom::End(0))?;
                }
                Inner::Member {
                    fs: fs.clone(),
                    chain,
                    entry,
                    stream: Some(stream),
                    dirty: false,
                }
            }
        };
        log::trace!("opened '{}'", path);
        Ok(Self {
            inner,
            path: path.to_string(),
            mode,
            encoding: Encoding::Utf8,
            closed: false,
        })
    }

    /// Returns the path the file was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the open mode.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Sets the encoding used by [`read_text`](Self::read_text) and
    /// [`write_text`](Self::write_text).
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Returns the text encoding.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Returns `true` once the file has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Reads the rest of the file as text.
    pub fn read_text(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        self.read_to_end(&mut bytes)?;
        self.encoding.decode(bytes)
    }

    /// Writes `text` in the file's encoding, returning the bytes written.
    pub fn write_text(&mut self, text: &str) -> Result<usize> {
        let bytes = self.encoding.encode(text)?;
        self.write_all(&bytes)?;
        Ok(bytes.len())
    }

    /// Closes the file.
    ///
    /// For a writable member this rebuilds its container and every
    /// container enclosing it. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match &mut self.inner {
            Inner::Physical(file) => {
                if self.mode.write {
                    file.flush()?;
                }
                Ok(())
            }
            Inner::Member {
                fs,
                chain,
                entry,
                stream,
                dirty,
            } => {
                let Some(stream) = stream.take() else {
                    return Ok(());
                };
                let changed = *dirty || self.mode.truncate || self.mode.create_new || self.mode.append;
                if !self.mode.write || !changed {
                    return Ok(());
                }
                log::debug!("writing back '{}'", self.path);
                fs.with_session(chain, Access::CREATE, |session| session.stage_stream(entry, stream))
            }
        }
    }

    fn check_open(&self, operation: &'static str, allowed: bool) -> io::Result<()> {
        if self.closed {
            return Err(closed());
        }
        if !allowed {
            return Err(Error::UnsupportedOperation {
                operation,
                path: self.path.clone(),
            }
            .into());
        }
        Ok(())
    }
}

fn closed() -> io::Error {
    Error::StreamClosed.into()
}

fn open_physical(path: &Path, mode: OpenMode) -> Result<File> {
    if path.is_dir() {
        return Err(Error::IsADirectory {
            path: path.display().to_string(),
        });
    }
    mode.open_options().open(path).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => Error::AlreadyExists {
            path: path.display().to_string(),
        },
        _ => Error::fs("open", path, e),
    })
}

/// Loads the initial content of a member for `mode`.
fn load_member(fs: &ArchiveFs, chain: &Chain, entry: &str, mode: OpenMode) -> Result<BufferedStream> {
    let display = format!("{}/{}", chain.display(), entry);
    if mode.truncate || mode.create_new {
        let info = fs.with_session(chain, Access::Read, |session| session.entry_info(entry));
        return match info {
            Ok(info) if info.is_dir => Err(Error::IsADirectory { path: display }),
            Ok(_) if mode.create_new => Err(Error::AlreadyExists { path: display }),
            Ok(_) | Err(Error::EntryNotFound { .. }) | Err(Error::ArchiveNotFound { .. }) => {
                Ok(BufferedStream::with_config(fs.config()))
            }
            Err(e) => Err(e),
        };
    }

    match fs.with_session(chain, Access::Read, |session| session.read_entry(entry)) {
        Ok(stream) => Ok(stream),
        Err(Error::EntryNotFound { .. }) | Err(Error::ArchiveNotFound { .. }) if mode.create => {
            Ok(BufferedStream::with_config(fs.config()))
        }
        Err(e) => Err(e),
    }
}

impl Read for VfsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open("read", self.mode.read)?;
        match &mut self.inner {
            Inner::Physical(file) => file.read(buf),
            Inner::Member { stream, .. } => stream.as_mut().ok_or_else(closed)?.read(buf),
        }
    }
}

impl Write for VfsFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_open("write", self.mode.write)?;
        let append = self.mode.append;
        match &mut self.inner {
            Inner::Physical(file) => file.write(buf),
            Inner::Member { stream, dirty, .. } => {
                let stream = stream.as_mut().ok_or_else(closed)?;
                if append {
                    stream.seek(SeekFrom::End(0))?;
                }
                *dirty = true;
                stream.write(buf)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            Inner::Physical(file) => file.flush(),
            Inner::Member { stream, .. } => match stream {
                Some(stream) => stream.flush(),
                None => Ok(()),
            },
        }
    }
}

impl Seek for VfsFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.closed {
            return Err(closed());
        }
        match &mut self.inner {
            Inner::Physical(file) => file.seek(pos),
            Inner::Member { stream, .. } => stream.as_mut().ok_or_else(closed)?.seek(pos),
        }
    }
}

impl Drop for VfsFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("failed to write back '{}' on drop: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        let r = OpenMode::parse("r").unwrap();
        assert!(r.read && !r.write && !r.create);

        let wb = OpenMode::parse("wb").unwrap();
        assert!(wb.write && wb.truncate && wb.create && wb.binary && !wb.read);

        let a_plus = OpenMode::parse("a+").unwrap();
        assert!(a_plus.read && a_plus.write && a_plus.append && !a_plus.truncate);

        let r_plus: OpenMode = "r+".parse().unwrap();
        assert!(r_plus.read && r_plus.write && !r_plus.create);

        let x = OpenMode::parse("xb").unwrap();
        assert!(x.create_new && x.write);
    }

    #[test]
    fn test_invalid_modes() {
        for mode in ["", "q", "rw", "r++", "rbt", "br", "wb+b"] {
            assert!(
                matches!(OpenMode::parse(mode), Err(Error::InvalidMode(_))),
                "mode {:?} should be rejected",
                mode
            );
        }
    }

    #[test]
    fn test_plus_after_qualifier_rejected() {
        assert!(OpenMode::parse("w+b").is_ok());
        assert!(OpenMode::parse("wb+").is_err());
    }
}

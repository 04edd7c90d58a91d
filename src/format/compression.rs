//! Stream compressions layered under tar and single-file containers.

use std::io::{self, Read, Write};

use crate::config::Config;

/// A compressing writer that must be finished to produce valid output.
pub trait FinishWrite: Write {
    /// Writes any trailing data and flushes the underlying writer.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Compression applied to a whole stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Bytes are stored as is.
    None,
    /// Gzip (RFC 1952). Concatenated members are read as one stream.
    Gzip,
    /// Bzip2. Concatenated streams are read as one stream.
    Bzip2,
    /// XZ.
    Xz,
}

impl Compression {
    /// Returns the conventional extension of the compression, if any.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gz"),
            Compression::Bzip2 => Some("bz2"),
            Compression::Xz => Some("xz"),
        }
    }

    /// Wraps `inner` in a decompressing reader.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Unsupported` if the compression was disabled at
    /// build time.
    pub fn reader<'a, R: Read + 'a>(self, inner: R) -> io::Result<Box<dyn Read + 'a>> {
        match self {
            Compression::None => Ok(Box::new(inner)),
            Compression::Gzip => Ok(Box::new(flate2::read::MultiGzDecoder::new(inner))),
            #[cfg(feature = "bzip2")]
            Compression::Bzip2 => Ok(Box::new(bzip2::read::MultiBzDecoder::new(inner))),
            #[cfg(feature = "xz")]
            Compression::Xz => Ok(Box::new(lzma_rust2::XzReader::new(inner, true))),
            #[allow(unreachable_patterns)]
            other => Err(disabled(other)),
        }
    }

    /// Wraps `inner` in a compressing writer using the levels in `config`.
    ///
    /// The returned writer must be [finished](FinishWrite::finish).
    pub fn writer<'a, W: Write + 'a>(
        self,
        inner: W,
        config: &Config,
    ) -> io::Result<Box<dyn FinishWrite + 'a>> {
        match self {
            Compression::None => Ok(Box::new(PlainEncoder { inner })),
            Compression::Gzip => Ok(Box::new(GzipEncoder::new(inner, config.gzip_level))),
            #[cfg(feature = "bzip2")]
            Compression::Bzip2 => Ok(Box::new(Bzip2Encoder::new(inner, config.bzip2_level))),
            #[cfg(feature = "xz")]
            Compression::Xz => Ok(Box::new(XzEncoder::new(inner, config.xz_preset)?)),
            #[allow(unreachable_patterns)]
            other => Err(disabled(other)),
        }
    }
}

#[allow(dead_code)]
fn disabled(compression: Compression) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{:?} support was not compiled in", compression),
    )
}

/// Pass-through writer for uncompressed streams.
struct PlainEncoder<W: Write> {
    inner: W,
}

impl<W: Write> Write for PlainEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> FinishWrite for PlainEncoder<W> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Gzip encoder.
pub struct GzipEncoder<W: Write> {
    inner: flate2::write::GzEncoder<W>,
}

impl<W: Write> std::fmt::Debug for GzipEncoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipEncoder").finish_non_exhaustive()
    }
}

impl<W: Write> GzipEncoder<W> {
    /// Creates a new gzip encoder with a level from 0 to 9.
    pub fn new(output: W, level: u32) -> Self {
        Self {
            inner: flate2::write::GzEncoder::new(output, flate2::Compression::new(level.min(9))),
        }
    }
}

impl<W: Write> Write for GzipEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> FinishWrite for GzipEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut inner = self.inner.finish()?;
        inner.flush()
    }
}

/// Bzip2 encoder.
#[cfg(feature = "bzip2")]
pub struct Bzip2Encoder<W: Write> {
    inner: bzip2::write::BzEncoder<W>,
}

#[cfg(feature = "bzip2")]
impl<W: Write> std::fmt::Debug for Bzip2Encoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bzip2Encoder").finish_non_exhaustive()
    }
}

#[cfg(feature = "bzip2")]
impl<W: Write> Bzip2Encoder<W> {
    /// Creates a new bzip2 encoder with a level from 1 to 9.
    pub fn new(output: W, level: u32) -> Self {
        Self {
            inner: bzip2::write::BzEncoder::new(output, bzip2::Compression::new(level.clamp(1, 9))),
        }
    }
}

#[cfg(feature = "bzip2")]
impl<W: Write> Write for Bzip2Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(feature = "bzip2")]
impl<W: Write> FinishWrite for Bzip2Encoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut inner = self.inner.finish()?;
        inner.flush()
    }
}

/// XZ encoder.
#[cfg(feature = "xz")]
pub struct XzEncoder<W: Write> {
    inner: lzma_rust2::XzWriter<W>,
}

#[cfg(feature = "xz")]
impl<W: Write> std::fmt::Debug for XzEncoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XzEncoder").finish_non_exhaustive()
    }
}

#[cfg(feature = "xz")]
impl<W: Write> XzEncoder<W> {
    /// Creates a new XZ encoder with a preset from 0 to 9.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream header cannot be written.
    pub fn new(output: W, preset: u32) -> io::Result<Self> {
        let options = lzma_rust2::XzOptions::with_preset(preset.min(9));
        let inner = lzma_rust2::XzWriter::new(output, options)
            .map_err(|e| io::Error::other(e.to_string()))?;
        Ok(Self { inner })
    }
}

#[cfg(feature = "xz")]
impl<W: Write> Write for XzEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(feature = "xz")]
impl<W: Write> FinishWrite for XzEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut inner = self
            .inner
            .finish()
            .map_err(|e| io::Error::other(e.to_string()))?;
        inner.flush()
    }
}

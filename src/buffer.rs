//! Memory-first byte buffers that spill to disk.
//!
//! [`BufferedStream`] is the scratch buffer behind every archive member
//! that is read or written. It starts in memory and, once its length
//! reaches the configured threshold, moves its bytes to an anonymous
//! temporary file. The move keeps both content and position, so readers
//! and writers never observe it.
//!
//! Every live stream is tracked in a process-wide registry so that
//! [`BufferedStream::flush_all`] and [`BufferedStream::close_all`] can reach
//! them from a signal or shutdown handler.
//!
//! # Example
//!
//! ```rust
//! use arcfs::BufferedStream;
//! use std::io::{Read, Seek, SeekFrom, Write};
//!
//! let mut stream = BufferedStream::with_threshold(4);
//! stream.write_all(b"hello world")?;
//! assert!(stream.is_spilled());
//!
//! stream.seek(SeekFrom::Start(6))?;
//! let mut tail = String::new();
//! stream.read_to_string(&mut tail)?;
//! assert_eq!(tail, "world");
//! # Ok::<(), std::io::Error>(())
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, Weak};

use crate::config::{self, Config};
use crate::{Error, Result};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

static OPEN_STREAMS: LazyLock<Mutex<HashMap<u64, Weak<Mutex<StreamState>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Acquires a mutex lock, recovering from poisoned state if necessary.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("buffered stream mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn closed_error() -> io::Error {
    Error::StreamClosed.into()
}

enum Backing {
    Memory(Cursor<Vec<u8>>),
    Spilled(File),
}

struct StreamState {
    backing: Backing,
    threshold: usize,
    temp_dir: Option<PathBuf>,
    spill_failed: bool,
    closed: bool,
}

impl StreamState {
    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(closed_error());
        }
        Ok(())
    }

    fn maybe_spill(&mut self) {
        let Backing::Memory(cursor) = &self.backing else {
            return;
        };
        if self.spill_failed || cursor.get_ref().len() < self.threshold {
            return;
        }
        match spill(cursor, self.temp_dir.as_deref()) {
            Ok(file) => {
                log::debug!(
                    "buffered stream spilled {} bytes to a temp file",
                    cursor.get_ref().len()
                );
                self.backing = Backing::Spilled(file);
            }
            Err(e) => {
                log::warn!("failed to spill buffered stream to disk, staying in memory: {}", e);
                self.spill_failed = true;
            }
        }
    }

    fn len(&self) -> io::Result<u64> {
        match &self.backing {
            Backing::Memory(cursor) => Ok(cursor.get_ref().len() as u64),
            Backing::Spilled(file) => Ok(file.metadata()?.len()),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Backing::Spilled(file) = &mut self.backing {
            if let Err(e) = file.flush() {
                log::warn!("failed to flush spilled stream on close: {}", e);
            }
        }
        // Dropping the anonymous temp file deletes it.
        self.backing = Backing::Memory(Cursor::new(Vec::new()));
        self.closed = true;
    }
}

fn spill(cursor: &Cursor<Vec<u8>>, dir: Option<&Path>) -> io::Result<File> {
    let mut file = match dir {
        Some(dir) => tempfile::tempfile_in(dir)?,
        None => tempfile::tempfile()?,
    };
    file.write_all(cursor.get_ref())?;
    file.seek(SeekFrom::Start(cursor.position()))?;
    Ok(file)
}

/// A seekable read/write byte stream that starts in memory and spills to a
/// temporary file once it grows past a threshold.
///
/// Writes happen at the current position, as with a file; seek to the end
/// first to append. After [`close`](Self::close) every read, write and seek
/// fails with [`Error::StreamClosed`] (reported through `io::Error`, which
/// converts back into the crate error with `?`).
pub struct BufferedStream {
    state: Arc<Mutex<StreamState>>,
    id: u64,
}

impl std::fmt::Debug for BufferedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("BufferedStream")
            .field("id", &self.id)
            .field("spilled", &matches!(state.backing, Backing::Spilled(_)))
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

impl BufferedStream {
    /// Creates an empty stream using the process-wide configuration.
    pub fn new() -> Self {
        Self::with_config(&config::global())
    }

    /// Creates an empty stream using the threshold and temp directory of `config`.
    pub fn with_config(config: &Config) -> Self {
        Self::create(config.resolved_buffer_threshold(), config.temp_dir.clone())
    }

    /// Creates an empty stream with an explicit spill threshold in bytes.
    pub fn with_threshold(threshold: usize) -> Self {
        Self::create(threshold, None)
    }

    /// Creates a stream holding `data`, positioned at the start.
    pub fn from_bytes(data: &[u8], config: &Config) -> Result<Self> {
        let mut stream = Self::with_config(config);
        stream.write_all(data)?;
        stream.rewind()?;
        Ok(stream)
    }

    fn create(threshold: usize, temp_dir: Option<PathBuf>) -> Self {
        let state = Arc::new(Mutex::new(StreamState {
            backing: Backing::Memory(Cursor::new(Vec::new())),
            threshold,
            temp_dir,
            spill_failed: false,
            closed: false,
        }));
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        lock(&OPEN_STREAMS).insert(id, Arc::downgrade(&state));
        Self { state, id }
    }

    /// Returns the current position.
    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.stream_position()?)
    }

    /// Returns the total number of bytes in the stream.
    pub fn len(&self) -> Result<u64> {
        let state = lock(&self.state);
        state.check_open()?;
        Ok(state.len()?)
    }

    /// Returns `true` if the stream holds no bytes.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns `true` once the stream has moved to a temporary file.
    pub fn is_spilled(&self) -> bool {
        matches!(lock(&self.state).backing, Backing::Spilled(_))
    }

    /// Returns `true` after [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Returns the spill threshold in bytes.
    pub fn threshold(&self) -> usize {
        lock(&self.state).threshold
    }

    /// Returns a copy of the whole content without moving the position.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut state = lock(&self.state);
        state.check_open()?;
        match &mut state.backing {
            Backing::Memory(cursor) => Ok(cursor.get_ref().clone()),
            Backing::Spilled(file) => {
                let position = file.stream_position()?;
                file.rewind()?;
                let mut data = Vec::new();
                file.read_to_end(&mut data)?;
                file.seek(SeekFrom::Start(position))?;
                Ok(data)
            }
        }
    }

    /// Copies the whole content into `out` without moving the position.
    ///
    /// Returns the number of bytes copied.
    pub fn copy_to(&self, out: &mut dyn Write) -> Result<u64> {
        let mut state = lock(&self.state);
        state.check_open()?;
        match &mut state.backing {
            Backing::Memory(cursor) => {
                out.write_all(cursor.get_ref())?;
                Ok(cursor.get_ref().len() as u64)
            }
            Backing::Spilled(file) => {
                let position = file.stream_position()?;
                file.rewind()?;
                let copied = io::copy(file, out)?;
                file.seek(SeekFrom::Start(position))?;
                Ok(copied)
            }
        }
    }

    /// Truncates the stream to zero length and rewinds it.
    pub fn clear(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.check_open()?;
        match &mut state.backing {
            Backing::Memory(cursor) => {
                cursor.get_mut().clear();
                cursor.set_position(0);
            }
            Backing::Spilled(file) => {
                file.set_len(0)?;
                file.rewind()?;
            }
        }
        Ok(())
    }

    /// Closes the stream and releases its temp file.
    ///
    /// Calling `close` again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        lock(&self.state).close();
        lock(&OPEN_STREAMS).remove(&self.id);
        Ok(())
    }

    /// Flushes every open stream in the process.
    ///
    /// Streams closed concurrently by their owners are skipped. Returns the
    /// number of streams flushed.
    pub fn flush_all() -> usize {
        let mut flushed = 0;
        for state in live_streams() {
            let mut state = lock(&state);
            if state.closed {
                continue;
            }
            if let Backing::Spilled(file) = &mut state.backing {
                if let Err(e) = file.flush() {
                    log::warn!("failed to flush buffered stream: {}", e);
                    continue;
                }
            }
            flushed += 1;
        }
        flushed
    }

    /// Closes every open stream in the process.
    ///
    /// Owners see [`Error::StreamClosed`] on their next operation. Returns
    /// the number of streams closed.
    pub fn close_all() -> usize {
        let mut closed = 0;
        for state in live_streams() {
            let mut state = lock(&state);
            if !state.closed {
                state.close();
                closed += 1;
            }
        }
        lock(&OPEN_STREAMS).retain(|_, weak| weak.strong_count() > 0);
        closed
    }

    /// Returns the number of open streams in the process.
    pub fn open_count() -> usize {
        live_streams()
            .iter()
            .filter(|state| !lock(state).closed)
            .count()
    }
}

/// Snapshots the registry so stream locks are never taken while it is held.
fn live_streams() -> Vec<Arc<Mutex<StreamState>>> {
    let registry = lock(&OPEN_STREAMS);
    registry.values().filter_map(Weak::upgrade).collect()
}

impl Default for BufferedStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BufferedStream {
    fn drop(&mut self) {
        lock(&self.state).close();
        lock(&OPEN_STREAMS).remove(&self.id);
    }
}

impl Read for BufferedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        state.check_open()?;
        match &mut state.backing {
            Backing::Memory(cursor) => cursor.read(buf),
            Backing::Spilled(file) => file.read(buf),
        }
    }
}

impl Write for BufferedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        state.check_open()?;
        let written = match &mut state.backing {
            Backing::Memory(cursor) => cursor.write(buf)?,
            Backing::Spilled(file) => file.write(buf)?,
        };
        state.maybe_spill();
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Ok(());
        }
        match &mut state.backing {
            Backing::Spilled(file) => file.flush(),
            Backing::Memory(_) => Ok(()),
        }
    }
}

impl Seek for BufferedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let mut state = lock(&self.state);
        state.check_open()?;
        match &mut state.backing {
            Backing::Memory(cursor) => cursor.seek(pos),
            Backing::Spilled(file) => file.seek(pos),
        }
    }
}

/// Text encodings supported by [`TextStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// UTF-8.
    #[default]
    Utf8,
    /// ISO-8859-1; every byte maps to the code point of the same value.
    Latin1,
    /// 7-bit ASCII.
    Ascii,
}

impl Encoding {
    /// Parses an encoding name such as `utf-8`, `latin-1` or `ascii`.
    pub fn parse(name: &str) -> Result<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "utf8" => Ok(Encoding::Utf8),
            "latin1" | "iso88591" | "l1" => Ok(Encoding::Latin1),
            "ascii" | "usascii" => Ok(Encoding::Ascii),
            _ => Err(Error::encoding("unknown", format!("unsupported encoding '{}'", name))),
        }
    }

    /// Returns the canonical name of the encoding.
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
            Encoding::Ascii => "ascii",
        }
    }

    /// Encodes `text` to bytes.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Latin1 | Encoding::Ascii => {
                let max = if *self == Encoding::Latin1 { 0xFF } else { 0x7F };
                text.chars()
                    .enumerate()
                    .map(|(index, c)| {
                        u8::try_from(u32::from(c))
                            .ok()
                            .filter(|b| u32::from(*b) <= max)
                            .ok_or_else(|| {
                                Error::encoding(
                                    self.name(),
                                    format!("cannot encode {:?} at position {}", c, index),
                                )
                            })
                    })
                    .collect()
            }
        }
    }

    /// Decodes `bytes` to text.
    pub fn decode(&self, bytes: Vec<u8>) -> Result<String> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes).map_err(|e| Error::encoding("utf-8", e.to_string())),
            Encoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
            Encoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(index) => Err(Error::encoding(
                    "ascii",
                    format!("byte {:#04x} at position {} is not ascii", bytes[index], index),
                )),
                None => Ok(bytes.into_iter().map(char::from).collect()),
            },
        }
    }
}

/// A text view over a [`BufferedStream`].
#[derive(Debug)]
pub struct TextStream {
    inner: BufferedStream,
    encoding: Encoding,
}

impl TextStream {
    /// Wraps a byte stream with an encoding.
    pub fn new(inner: BufferedStream, encoding: Encoding) -> Self {
        Self { inner, encoding }
    }

    /// Returns the encoding in use.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Encodes and writes `text` at the current position.
    ///
    /// Returns the number of bytes written.
    pub fn write_str(&mut self, text: &str) -> Result<usize> {
        let bytes = self.encoding.encode(text)?;
        self.inner.write_all(&bytes)?;
        Ok(bytes.len())
    }

    /// Reads and decodes everything from the current position to the end.
    pub fn read_to_string(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        self.inner.read_to_end(&mut bytes)?;
        self.encoding.decode(bytes)
    }

    /// Reads one line, including its trailing `\n` if present.
    ///
    /// Returns an empty string at end of stream.
    pub fn read_line(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            if self.inner.read(&mut byte)? == 0 {
                break;
            }
            bytes.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }
        self.encoding.decode(bytes)
    }

    /// Returns the underlying byte stream.
    pub fn get_mut(&mut self) -> &mut BufferedStream {
        &mut self.inner
    }

    /// Unwraps the underlying byte stream.
    pub fn into_inner(self) -> BufferedStream {
        self.inner
    }

    /// Closes the underlying byte stream.
    pub fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

//! Error types for virtual filesystem operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when working with archive-backed paths, along with a
//! convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. Errors
//! that concern a location carry the full virtual path, including every
//! archive boundary crossed on the way:
//!
//! ```rust,no_run
//! use arcfs::{ArchiveFs, Error};
//!
//! fn read_config(fs: &ArchiveFs) -> arcfs::Result<Vec<u8>> {
//!     match fs.read("bundle.zip/conf/app.toml") {
//!         Ok(bytes) => Ok(bytes),
//!         Err(Error::ArchiveNotFound { path }) => {
//!             eprintln!("no such archive: {}", path);
//!             Ok(Vec::new())
//!         }
//!         Err(e @ Error::CorruptArchive { .. }) => {
//!             eprintln!("archive is damaged: {}", e);
//!             Err(e)
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! ```

use std::io;

/// The main error type for virtual filesystem operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io], [`FileSystem`][Self::FileSystem] | Physical file operations |
/// | Lookup | [`NotFound`][Self::NotFound], [`ArchiveNotFound`][Self::ArchiveNotFound], [`EntryNotFound`][Self::EntryNotFound] | Missing paths |
/// | Format | [`CorruptArchive`][Self::CorruptArchive], [`UnsupportedFormat`][Self::UnsupportedFormat] | Invalid container data |
/// | Kind | [`NotADirectory`][Self::NotADirectory], [`IsADirectory`][Self::IsADirectory], [`DirectoryNotEmpty`][Self::DirectoryNotEmpty] | Wrong entry type |
/// | Usage | [`InvalidPath`][Self::InvalidPath], [`InvalidMode`][Self::InvalidMode], [`UnsupportedOperation`][Self::UnsupportedOperation] | Caller mistakes |
/// | Streams | [`StreamClosed`][Self::StreamClosed], [`EncodingError`][Self::EncodingError] | Buffer misuse, text decoding |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error that could not be attributed to a specific path.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// A physical filesystem operation failed.
    #[error("failed to {operation} '{path}': {source}")]
    FileSystem {
        /// The operation being performed (e.g. "open", "rename").
        operation: &'static str,
        /// The physical path involved.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The path given to the resolver is empty or malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The open mode string could not be parsed.
    #[error("invalid mode '{0}'")]
    InvalidMode(String),

    /// A physical path does not exist.
    #[error("no such file or directory: {path}")]
    NotFound {
        /// The missing path.
        path: String,
    },

    /// Read access into a container that does not exist.
    #[error("archive not found: {path}")]
    ArchiveNotFound {
        /// The virtual path of the missing container.
        path: String,
    },

    /// A path crosses an archive boundary to a member that does not exist.
    #[error("entry not found: {path}")]
    EntryNotFound {
        /// The full virtual path of the missing entry.
        path: String,
    },

    /// The target of a create operation already exists.
    #[error("already exists: {path}")]
    AlreadyExists {
        /// The conflicting path.
        path: String,
    },

    /// A codec failed to parse the container structure.
    ///
    /// The underlying parse error is kept as the source so callers can
    /// inspect it; a corrupt container is never treated as empty.
    #[error("corrupt archive '{path}': {source}")]
    CorruptArchive {
        /// The virtual path of the container.
        path: String,
        /// The parse error reported by the codec.
        #[source]
        source: io::Error,
    },

    /// No registered codec claims the container name.
    #[error("no codec registered for '{path}'")]
    UnsupportedFormat {
        /// The container path.
        path: String,
    },

    /// The container format cannot perform the requested operation.
    ///
    /// For example, single-member compressions have no directories.
    #[error("{operation} is not supported for '{path}'")]
    UnsupportedOperation {
        /// The rejected operation.
        operation: &'static str,
        /// The path it was attempted on.
        path: String,
    },

    /// A directory operation was attempted on a file.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: String,
    },

    /// A file operation was attempted on a directory.
    #[error("is a directory: {path}")]
    IsADirectory {
        /// The offending path.
        path: String,
    },

    /// Non-recursive removal of a populated directory.
    #[error("directory not empty: {path}")]
    DirectoryNotEmpty {
        /// The directory path.
        path: String,
    },

    /// An operation was attempted on a closed [`BufferedStream`](crate::BufferedStream).
    #[error("stream is closed")]
    StreamClosed,

    /// Text could not be decoded or encoded.
    #[error("{encoding} encoding error: {reason}")]
    EncodingError {
        /// The encoding in use.
        encoding: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// A configuration key is not known.
    #[error("unknown configuration key '{0}'")]
    UnknownConfigKey(String),

    /// A configuration value could not be applied.
    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidConfigValue {
        /// The configuration key.
        key: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Restoring a backup after a failed transaction failed as well.
    ///
    /// The error that aborted the transaction is kept in `cause`.
    #[error("failed to restore '{path}' after transaction error ({cause}): {source}")]
    RollbackFailed {
        /// The container that could not be restored.
        path: String,
        /// The restore failure.
        #[source]
        source: io::Error,
        /// The error that aborted the transaction body.
        cause: Box<Error>,
    },
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        // Streams report crate errors through the std::io traits; unwrap them.
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(err) => Error::Io(err),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Io(e) => e.kind(),
            Error::NotFound { .. }
            | Error::ArchiveNotFound { .. }
            | Error::EntryNotFound { .. } => io::ErrorKind::NotFound,
            Error::AlreadyExists { .. } => io::ErrorKind::AlreadyExists,
            Error::CorruptArchive { .. } | Error::EncodingError { .. } => {
                io::ErrorKind::InvalidData
            }
            Error::InvalidPath(_) | Error::InvalidMode(_) => io::ErrorKind::InvalidInput,
            Error::UnsupportedOperation { .. } | Error::UnsupportedFormat { .. } => {
                io::ErrorKind::Unsupported
            }
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

impl Error {
    /// Returns `true` if the error means the path does not exist.
    ///
    /// This covers missing physical paths, missing containers, and missing
    /// entries inside a container.
    ///
    /// # Example
    ///
    /// ```rust
    /// use arcfs::Error;
    ///
    /// let err = Error::EntryNotFound { path: "a.zip/missing.txt".into() };
    /// assert!(err.is_not_found());
    /// ```
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } | Error::ArchiveNotFound { .. } | Error::EntryNotFound { .. } => {
                true
            }
            Error::Io(e) | Error::FileSystem { source: e, .. } => {
                e.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }

    /// Returns `true` if this is a data corruption error.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::CorruptArchive { .. })
    }

    /// Returns the path associated with this error, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::FileSystem { path, .. }
            | Error::NotFound { path }
            | Error::ArchiveNotFound { path }
            | Error::EntryNotFound { path }
            | Error::AlreadyExists { path }
            | Error::CorruptArchive { path, .. }
            | Error::UnsupportedFormat { path }
            | Error::UnsupportedOperation { path, .. }
            | Error::NotADirectory { path }
            | Error::IsADirectory { path }
            | Error::DirectoryNotEmpty { path }
            | Error::RollbackFailed { path, .. } => Some(path.as_str()),
            Error::InvalidPath(path) => Some(path.as_str()),
            _ => None,
        }
    }

    /// Wraps a physical filesystem error with the operation and path.
    ///
    /// A `NotFound` I/O error becomes [`Error::NotFound`] so that lookups
    /// behave the same inside and outside archives.
    pub fn fs(operation: &'static str, path: impl AsRef<std::path::Path>, source: io::Error) -> Self {
        let path = path.as_ref().display().to_string();
        if source.kind() == io::ErrorKind::NotFound {
            return Error::NotFound { path };
        }
        Error::FileSystem {
            operation,
            path,
            source,
        }
    }

    /// Creates an [`Error::EncodingError`].
    pub fn encoding(encoding: &'static str, reason: impl Into<String>) -> Self {
        Error::EncodingError {
            encoding,
            reason: reason.into(),
        }
    }
}

/// A specialized Result type for virtual filesystem operations.
pub type Result<T> = std::result::Result<T, Error>;

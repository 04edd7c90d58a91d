//! # arcfs
//!
//! A virtual filesystem in which archives behave like directories.
//!
//! Paths may cross any number of container boundaries:
//! `backups/site.zip/assets/fonts.tar.gz/regular.ttf` names a file inside a
//! gzipped tar inside a zip inside a plain directory. Reads extract the
//! member; writes stage the change and rebuild every enclosing container
//! once, replacing the file on disk atomically.
//!
//! ## Quick Start
//!
//! ### Reading and Writing
//!
//! ```rust,no_run
//! use arcfs::{ArchiveFs, Result};
//!
//! fn main() -> Result<()> {
//!     let fs = ArchiveFs::new();
//!
//!     // Creates site.zip and the members' directories as needed
//!     fs.write("site.zip/index.html", "<h1>hello</h1>")?;
//!     fs.append("site.zip/logs/access.log", "GET /\n")?;
//!
//!     let page = fs.read_to_string("site.zip/index.html")?;
//!     println!("{}", page);
//!     Ok(())
//! }
//! ```
//!
//! ### Browsing
//!
//! ```rust,no_run
//! use arcfs::{ArchiveFs, Result};
//!
//! fn main() -> Result<()> {
//!     let fs = ArchiveFs::new();
//!
//!     for name in fs.list_dir("site.zip")? {
//!         let info = fs.get_info(&format!("site.zip/{}", name))?;
//!         println!("{}: {} bytes, dir: {}", name, info.size, info.is_dir);
//!     }
//!
//!     // Walk descends into nested archives
//!     for entry in fs.walk("backups") {
//!         let entry = entry?;
//!         println!("{} has {} files", entry.root, entry.files.len());
//!     }
//!
//!     for path in fs.glob("backups/*.tar.gz/*.conf")? {
//!         println!("{}", path);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Streaming
//!
//! ```rust,no_run
//! use arcfs::{ArchiveFs, Result};
//! use std::io::Write;
//!
//! fn main() -> Result<()> {
//!     let fs = ArchiveFs::new();
//!     let mut file = fs.open("data.tar.xz/events.csv", "w")?;
//!     for i in 0..1000 {
//!         writeln!(file, "{},event", i)?;
//!     }
//!     // The archive is rebuilt once, on close
//!     file.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Formats
//!
//! | Extension | Codec |
//! |-----------|-------|
//! | `zip`, `jar`, `war`, `ear`, `apk` | [`ZipCodec`](format::ZipCodec) |
//! | `tar`, `tar.gz`, `tgz`, `tar.bz2`, `tbz2`, `tar.xz`, `txz` | [`TarCodec`](format::TarCodec) |
//! | `gz`, `bz2`, `xz` | [`SingleFileCodec`](format::SingleFileCodec) |
//!
//! Further formats are added by registering a [`FormatCodec`] with a
//! [`FormatRegistry`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `bzip2` | Yes | BZip2 compression (`.bz2`, `.tar.bz2`) |
//! | `xz` | Yes | XZ compression (`.xz`, `.tar.xz`) |
//! | `sysinfo` | No | Size the in-memory buffer limit from system RAM |
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`. Errors carry the full virtual path:
//!
//! ```rust,no_run
//! use arcfs::{ArchiveFs, Error};
//!
//! let fs = ArchiveFs::new();
//! match fs.read("missing.zip/file.txt") {
//!     Err(Error::ArchiveNotFound { path }) => eprintln!("no archive at {}", path),
//!     Err(e) if e.is_corruption() => eprintln!("damaged: {}", e),
//!     Err(e) => eprintln!("{}", e),
//!     Ok(bytes) => println!("{} bytes", bytes.len()),
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade and never
//! installs a logger. Setting `debug_level` in the global
//! configuration raises the maximum log level.
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod batch;
pub mod buffer;
pub mod config;
pub mod error;
pub mod format;
pub mod fs;
pub mod path;
pub mod session;
pub mod timestamp;

pub use batch::Batch;
pub use buffer::{BufferedStream, Encoding, TextStream};
pub use config::{Config, ZipMethod};
pub use error::{Error, Result};
pub use format::{FormatCodec, FormatRegistry};
pub use fs::{ArchiveFs, FileInfo, OpenMode, VfsFile, Walk, WalkEntry};
pub use path::{PathResolver, ResolvedPath};
pub use session::ArchiveSession;

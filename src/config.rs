//! Runtime configuration.
//!
//! This module provides [`Config`], the knobs read by buffered streams when
//! they are created and by archive sessions when they rebuild containers.
//! A process-wide instance is available through [`global`] and friends;
//! [`ArchiveFs`](crate::ArchiveFs) takes a snapshot of it at construction.
//!
//! # Example
//!
//! ```rust
//! use arcfs::config::{self, Config, ZipMethod};
//!
//! // Builder-style configuration
//! let config = Config::new()
//!     .buffer_threshold(16 * 1024 * 1024) // 16 MiB
//!     .zip_method(ZipMethod::Stored);
//!
//! // String-keyed access for configuration files and CLIs
//! let mut config = Config::default();
//! config.set("gzip.level", "9").unwrap();
//! assert_eq!(config.get("gzip.level").unwrap(), "9");
//! assert!(config.set("gzip.window", "15").is_err());
//! ```

use std::path::PathBuf;
use std::sync::{LazyLock, RwLock};

use crate::{Error, Result};

/// Smallest auto-sized buffer threshold.
const MIN_AUTO_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Largest auto-sized buffer threshold.
const MAX_AUTO_THRESHOLD: u64 = 2 * 1024 * 1024 * 1024;

/// Total memory assumed when it cannot be detected.
const FALLBACK_TOTAL_MEMORY: u64 = 8 * 1024 * 1024 * 1024;

/// Every key understood by [`Config::get`], [`Config::set`] and [`Config::reset`].
const KEYS: &[&str] = &[
    "buffer_threshold",
    "debug_level",
    "temp_dir",
    "zip.method",
    "gzip.level",
    "bzip2.level",
    "xz.preset",
];

/// Compression used for new and rewritten zip members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZipMethod {
    /// No compression.
    Stored,
    /// Deflate compression.
    #[default]
    Deflated,
}

impl ZipMethod {
    /// Returns the configuration name of this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            ZipMethod::Stored => "stored",
            ZipMethod::Deflated => "deflated",
        }
    }
}

/// Configuration for buffering and container rebuilds.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Size at which a buffered stream spills from memory to a temp file.
    ///
    /// `None` sizes the threshold from system memory, see
    /// [`Config::resolved_buffer_threshold`]. Default: `None`.
    pub buffer_threshold: Option<usize>,

    /// Diagnostic verbosity, 0 (warnings only) to 3 (trace).
    ///
    /// Default: 0.
    pub debug_level: u8,

    /// Directory for spill files.
    ///
    /// `None` uses the system temp directory. Rebuilt containers are always
    /// staged next to their target so the final rename stays atomic.
    pub temp_dir: Option<PathBuf>,

    /// Compression method for zip members written by this crate.
    ///
    /// Default: [`ZipMethod::Deflated`].
    pub zip_method: ZipMethod,

    /// Gzip compression level (0-9), for `.gz` and `.tar.gz`.
    ///
    /// Default: 6.
    pub gzip_level: u32,

    /// Bzip2 block size level (1-9), for `.bz2` and `.tar.bz2`.
    ///
    /// Default: 9.
    pub bzip2_level: u32,

    /// XZ preset (0-9), for `.xz` and `.tar.xz`.
    ///
    /// Default: 6.
    pub xz_preset: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_threshold: None,
            debug_level: 0,
            temp_dir: None,
            zip_method: ZipMethod::Deflated,
            gzip_level: 6,
            bzip2_level: 9,
            xz_preset: 6,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a fixed buffer threshold in bytes.
    pub fn buffer_threshold(mut self, bytes: usize) -> Self {
        self.buffer_threshold = Some(bytes);
        self
    }

    /// Sets the diagnostic verbosity.
    pub fn debug_level(mut self, level: u8) -> Self {
        self.debug_level = level;
        self
    }

    /// Sets the directory for spill files.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Sets the zip member compression method.
    pub fn zip_method(mut self, method: ZipMethod) -> Self {
        self.zip_method = method;
        self
    }

    /// Sets the gzip compression level.
    pub fn gzip_level(mut self, level: u32) -> Self {
        self.gzip_level = level.min(9);
        self
    }

    /// Sets the bzip2 compression level.
    pub fn bzip2_level(mut self, level: u32) -> Self {
        self.bzip2_level = level.clamp(1, 9);
        self
    }

    /// Sets the xz preset.
    pub fn xz_preset(mut self, preset: u32) -> Self {
        self.xz_preset = preset.min(9);
        self
    }

    /// Resolves the buffer threshold to an actual byte count.
    ///
    /// An explicit threshold is returned as is. Otherwise the threshold is
    /// 1/32 of total system memory, clamped to 100 MiB..=2 GiB.
    pub fn resolved_buffer_threshold(&self) -> usize {
        match self.buffer_threshold {
            Some(bytes) => bytes,
            None => auto_threshold(total_memory()),
        }
    }

    /// Returns the log level matching [`Config::debug_level`].
    pub fn log_level(&self) -> log::LevelFilter {
        match self.debug_level {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    /// Returns every key understood by the string-keyed accessors.
    pub fn keys() -> &'static [&'static str] {
        KEYS
    }

    /// Returns the value of a key rendered as a string.
    ///
    /// An auto-sized buffer threshold reads as `auto`, an unset temp
    /// directory as an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownConfigKey`] for keys not listed in [`Config::keys`].
    pub fn get(&self, key: &str) -> Result<String> {
        let value = match key {
            "buffer_threshold" => match self.buffer_threshold {
                Some(bytes) => bytes.to_string(),
                None => "auto".to_string(),
            },
            "debug_level" => self.debug_level.to_string(),
            "temp_dir" => self
                .temp_dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_default(),
            "zip.method" => self.zip_method.as_str().to_string(),
            "gzip.level" => self.gzip_level.to_string(),
            "bzip2.level" => self.bzip2_level.to_string(),
            "xz.preset" => self.xz_preset.to_string(),
            _ => return Err(Error::UnknownConfigKey(key.to_string())),
        };
        Ok(value)
    }

    /// Parses and stores the value of a key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownConfigKey`] for unknown keys and
    /// [`Error::InvalidConfigValue`] for values that do not parse or are
    /// out of range.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "buffer_threshold" => {
                self.buffer_threshold = if value.eq_ignore_ascii_case("auto") {
                    None
                } else {
                    let bytes: usize = parse_value(key, value)?;
                    if bytes == 0 {
                        return Err(invalid(key, value, "must be greater than 0"));
                    }
                    Some(bytes)
                };
            }
            "debug_level" => self.debug_level = parse_value(key, value)?,
            "temp_dir" => {
                self.temp_dir = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "zip.method" => {
                self.zip_method = match value.to_ascii_lowercase().as_str() {
                    "stored" | "store" => ZipMethod::Stored,
                    "deflated" | "deflate" => ZipMethod::Deflated,
                    _ => return Err(invalid(key, value, "expected 'stored' or 'deflated'")),
                };
            }
            "gzip.level" => self.gzip_level = parse_level(key, value, 0)?,
            "bzip2.level" => self.bzip2_level = parse_level(key, value, 1)?,
            "xz.preset" => self.xz_preset = parse_level(key, value, 0)?,
            _ => return Err(Error::UnknownConfigKey(key.to_string())),
        }
        Ok(())
    }

    /// Restores a key to its default value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownConfigKey`] for unknown keys.
    pub fn reset(&mut self, key: &str) -> Result<()> {
        let defaults = Config::default();
        match key {
            "buffer_threshold" => self.buffer_threshold = defaults.buffer_threshold,
            "debug_level" => self.debug_level = defaults.debug_level,
            "temp_dir" => self.temp_dir = defaults.temp_dir,
            "zip.method" => self.zip_method = defaults.zip_method,
            "gzip.level" => self.gzip_level = defaults.gzip_level,
            "bzip2.level" => self.bzip2_level = defaults.bzip2_level,
            "xz.preset" => self.xz_preset = defaults.xz_preset,
            _ => return Err(Error::UnknownConfigKey(key.to_string())),
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> Error {
    Error::InvalidConfigValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, value, &e.to_string()))
}

fn parse_level(key: &str, value: &str, min: u32) -> Result<u32> {
    let level: u32 = parse_value(key, value)?;
    if !(min..=9).contains(&level) {
        return Err(invalid(key, value, &format!("must be between {} and 9", min)));
    }
    Ok(level)
}

fn auto_threshold(total_memory: u64) -> usize {
    let target = (total_memory / 32).clamp(MIN_AUTO_THRESHOLD, MAX_AUTO_THRESHOLD);
    usize::try_from(target).unwrap_or(usize::MAX)
}

/// Total system memory, probed once per process.
#[cfg(feature = "sysinfo")]
static TOTAL_MEMORY: LazyLock<u64> = LazyLock::new(|| {
    use sysinfo::System;

    let mut sys = System::new();
    sys.refresh_memory();

    match sys.total_memory() {
        0 => FALLBACK_TOTAL_MEMORY,
        total => total,
    }
});

#[cfg(feature = "sysinfo")]
fn total_memory() -> u64 {
    *TOTAL_MEMORY
}

#[cfg(not(feature = "sysinfo"))]
fn total_memory() -> u64 {
    FALLBACK_TOTAL_MEMORY
}

static GLOBAL: LazyLock<RwLock<Config>> = LazyLock::new(|| RwLock::new(Config::default()));

/// Returns a copy of the process-wide configuration.
pub fn global() -> Config {
    match GLOBAL.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => {
            log::warn!("global config lock was poisoned, recovering");
            poisoned.into_inner().clone()
        }
    }
}

/// Replaces the process-wide configuration.
///
/// A non-zero [`Config::debug_level`] also raises the `log` crate's maximum
/// level accordingly.
pub fn set_global(config: Config) {
    if config.debug_level > 0 {
        log::set_max_level(config.log_level());
    }
    let mut guard = GLOBAL.write().unwrap_or_else(|poisoned| {
        log::warn!("global config lock was poisoned, recovering");
        poisoned.into_inner()
    });
    *guard = config;
}

/// Modifies the process-wide configuration in place.
///
/// # Errors
///
/// Propagates the closure's error; the configuration is left unchanged in
/// that case.
pub fn update_global<F>(update: F) -> Result<()>
where
    F: FnOnce(&mut Config) -> Result<()>,
{
    let mut config = global();
    update(&mut config)?;
    set_global(config);
    Ok(())
}

/// Restores the process-wide configuration to its defaults.
pub fn reset_global() {
    set_global(Config::default());
}

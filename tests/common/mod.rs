//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use arcfs::{ArchiveFs, Config};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tempfile::TempDir;

/// Creates a scratch directory and a filesystem with default settings.
pub fn setup() -> (TempDir, ArchiveFs) {
    setup_with(Config::default())
}

/// Creates a scratch directory and a filesystem using `config`.
pub fn setup_with(config: Config) -> (TempDir, ArchiveFs) {
    let dir = TempDir::new().expect("create temp dir");
    (dir, ArchiveFs::with_config(config))
}

/// Builds an absolute virtual path below `dir`.
pub fn vpath(dir: &TempDir, rest: &str) -> String {
    format!("{}/{}", dir.path().display(), rest)
}

/// Deterministic pseudo-random bytes.
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}

/// Extensions of the built-in multi-member formats.
pub fn multi_member_formats() -> Vec<&'static str> {
    let mut formats = vec!["zip", "jar", "tar", "tar.gz", "tgz"];
    #[cfg(feature = "bzip2")]
    formats.extend(["tar.bz2", "tbz2"]);
    #[cfg(feature = "xz")]
    formats.extend(["tar.xz", "txz"]);
    formats
}

/// Extensions of the built-in single-member formats.
pub fn single_member_formats() -> Vec<&'static str> {
    let mut formats = vec!["gz"];
    #[cfg(feature = "bzip2")]
    formats.push("bz2");
    #[cfg(feature = "xz")]
    formats.push("xz");
    formats
}

/// Names of files directly inside `dir` on disk that start with `.arcfs-`.
pub fn leftover_temp_files(dir: &TempDir) -> Vec<String> {
    std::fs::read_dir(dir.path())
        .expect("read temp dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".arcfs-"))
        .collect()
}

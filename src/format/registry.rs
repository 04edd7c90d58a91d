//! Extension to codec mapping.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Compression, FormatCategory, FormatCodec, SingleFileCodec, TarCodec, ZipCodec};

static GLOBAL: LazyLock<Arc<FormatRegistry>> = LazyLock::new(|| Arc::new(FormatRegistry::new()));

/// Maps archive extensions to codecs.
///
/// Extensions are matched case-insensitively against whole dotted suffixes
/// of a file name, longest first, so `site.tar.gz` matches `tar.gz` before
/// `gz` while `targz` matches nothing.
///
/// # Example
///
/// ```rust
/// use arcfs::format::FormatRegistry;
///
/// let registry = FormatRegistry::new();
/// assert_eq!(registry.matching_extension("Backup.TAR.GZ").as_deref(), Some("tar.gz"));
/// assert_eq!(registry.lookup("notes.txt.gz").unwrap().name(), "gz");
/// assert!(registry.lookup("notes.txt").is_none());
/// ```
pub struct FormatRegistry {
    codecs: RwLock<BTreeMap<String, Arc<dyn FormatCodec>>>,
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("extensions", &self.extensions())
            .finish()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry {
    /// Creates a registry holding the built-in formats.
    pub fn new() -> Self {
        let registry = Self::empty();
        for (ext, codec) in builtin_codecs() {
            registry.register(ext, codec);
        }
        registry
    }

    /// Creates a registry with no formats.
    pub fn empty() -> Self {
        Self {
            codecs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the process-wide registry used by [`ArchiveFs::new`](crate::ArchiveFs::new).
    pub fn global() -> Arc<FormatRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Associates `extension` with `codec`.
    ///
    /// The extension is case-insensitive and may be given with or without
    /// a leading dot. Registering an extension again replaces the previous
    /// codec.
    pub fn register(&self, extension: &str, codec: Arc<dyn FormatCodec>) {
        let key = extension.trim_start_matches('.').to_ascii_lowercase();
        if key.is_empty() {
            log::warn!("ignoring registration of an empty extension");
            return;
        }
        log::debug!("registering codec '{}' for '.{}'", codec.name(), key);
        if let Some(previous) = self.write().insert(key.clone(), codec) {
            log::debug!("codec '{}' for '.{}' replaced", previous.name(), key);
        }
    }

    /// Returns the extension under which `name` is registered, if any.
    ///
    /// Only the last path component of `name` is examined. A name that is
    /// nothing but an extension (`.zip`) does not match.
    pub fn matching_extension(&self, name: &str) -> Option<String> {
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
        let lower = base.to_ascii_lowercase();
        let codecs = self.read();
        // Dots in order from the left give suffixes from longest to shortest.
        for (index, _) in lower.match_indices('.') {
            if index == 0 {
                continue;
            }
            let suffix = &lower[index + 1..];
            if codecs.contains_key(suffix) {
                return Some(suffix.to_string());
            }
        }
        None
    }

    /// Returns the codec for the container `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn FormatCodec>> {
        let ext = self.matching_extension(name)?;
        self.read().get(&ext).cloned()
    }

    /// Returns the codec registered for `extension` exactly.
    pub fn codec_for_extension(&self, extension: &str) -> Option<Arc<dyn FormatCodec>> {
        let key = extension.trim_start_matches('.').to_ascii_lowercase();
        self.read().get(&key).cloned()
    }

    /// Returns all registered extensions, sorted.
    pub fn extensions(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Returns registered extensions grouped by category.
    pub fn list_formats(&self) -> BTreeMap<FormatCategory, Vec<String>> {
        let mut formats: BTreeMap<FormatCategory, Vec<String>> = BTreeMap::new();
        for (ext, codec) in self.read().iter() {
            formats.entry(codec.category()).or_default().push(ext.clone());
        }
        formats
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<dyn FormatCodec>>> {
        self.codecs.read().unwrap_or_else(|poisoned| {
            log::warn!("format registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<dyn FormatCodec>>> {
        self.codecs.write().unwrap_or_else(|poisoned| {
            log::warn!("format registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

fn builtin_codecs() -> Vec<(&'static str, Arc<dyn FormatCodec>)> {
    let zip: Arc<dyn FormatCodec> = Arc::new(ZipCodec::new());
    let tar: Arc<dyn FormatCodec> = Arc::new(TarCodec::new(Compression::None));
    let tar_gz: Arc<dyn FormatCodec> = Arc::new(TarCodec::new(Compression::Gzip));
    let gz: Arc<dyn FormatCodec> = Arc::new(SingleFileCodec::new(Compression::Gzip));

    let mut codecs = vec![
        ("zip", Arc::clone(&zip)),
        ("jar", Arc::clone(&zip)),
        ("war", Arc::clone(&zip)),
        ("ear", Arc::clone(&zip)),
        ("apk", zip),
        ("tar", tar),
        ("tar.gz", Arc::clone(&tar_gz)),
        ("tgz", tar_gz),
        ("gz", gz),
    ];

    #[cfg(feature = "bzip2")]
    {
        let tar_bz2: Arc<dyn FormatCodec> = Arc::new(TarCodec::new(Compression::Bzip2));
        codecs.push(("tar.bz2", Arc::clone(&tar_bz2)));
        codecs.push(("tbz2", tar_bz2));
        codecs.push(("bz2", Arc::new(SingleFileCodec::new(Compression::Bzip2))));
    }

    #[cfg(feature = "xz")]
    {
        let tar_xz: Arc<dyn FormatCodec> = Arc::new(TarCodec::new(Compression::Xz));
        codecs.push(("tar.xz", Arc::clone(&tar_xz)));
        codecs.push(("txz", tar_xz));
        codecs.push(("xz", Arc::new(SingleFileCodec::new(Compression::Xz))));
    }

    codecs
}

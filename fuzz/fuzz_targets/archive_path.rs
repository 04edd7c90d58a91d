//! Fuzz target for virtual path resolution with arbitrary string input.
//!
//! Run with: cargo +nightly fuzz run archive_path
//!
//! Properties checked:
//! - NUL bytes are rejected
//! - Backslashes never survive resolution
//! - The prefix and segments reassemble into the normalized path

#![no_main]

use arcfs::PathResolver;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(path) = std::str::from_utf8(data) else {
        return;
    };
    let resolver = PathResolver::global();
    let Ok(resolved) = resolver.resolve(path) else {
        assert!(path.is_empty() || path.contains('\0'), "rejected {:?}", path);
        return;
    };
    assert!(!path.contains('\0'), "NUL byte accepted: {:?}", path);

    let prefix = resolved.physical_prefix();
    assert!(!prefix.contains('\\'), "backslash in prefix: {:?}", prefix);
    for segment in resolved.archive_segments() {
        assert!(!segment.is_empty(), "empty segment in {:?}", path);
        assert!(!segment.contains(['/', '\\']), "separator in segment {:?}", segment);
    }

    if !resolved.is_physical() {
        let (_, name) = prefix.rsplit_once('/').unwrap_or(("", prefix));
        assert!(resolver.is_archive_name(name), "split at non-archive {:?}", name);
        let parent = resolved.parent_archive().expect("member has a container");
        assert_eq!(parent.physical_prefix(), prefix);
    }

    let _ = resolver.base_name(prefix);
    let _ = arcfs::path::join(prefix, resolved.archive_segments());
});

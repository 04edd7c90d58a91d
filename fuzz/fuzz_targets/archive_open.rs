//! Fuzz target for opening arbitrary bytes as a container.
//!
//! Every registered codec gets the same input. Listing, reading and
//! rebuilding must fail with an error rather than panic or hang.
//!
//! Run with: cargo +nightly fuzz run archive_open

#![no_main]

use arcfs::{ArchiveSession, Config, FormatRegistry};
use libfuzzer_sys::fuzz_target;
use std::io::{Cursor, Read};
use std::time::SystemTime;

fuzz_target!(|data: &[u8]| {
    let registry = FormatRegistry::new();
    let config = Config::default().buffer_threshold(64 * 1024);

    for ext in registry.extensions() {
        let Some(codec) = registry.codec_for_extension(&ext) else {
            continue;
        };
        let mut session = ArchiveSession::open(
            codec,
            Some(Box::new(Cursor::new(data.to_vec()))),
            format!("fuzz.{}", ext),
            SystemTime::now(),
            config.clone(),
        );

        let Ok(children) = session.list_children("") else {
            continue;
        };
        for (name, is_dir) in children {
            if is_dir {
                let _ = session.list_dir(&name);
            } else if let Ok(mut stream) = session.read_entry(&name) {
                let mut sink = Vec::new();
                let _ = stream.read_to_end(&mut sink);
            }
        }

        // A source that parsed must also survive a rebuild
        let _ = session.write_entry("fuzz.txt", b"fuzz");
        let mut out = Cursor::new(Vec::new());
        let _ = session.apply(&mut out);
    }
});

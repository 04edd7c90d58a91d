//! Damaged containers are reported, never silently rewritten.

mod common;

use arcfs::Error;
use common::{leftover_temp_files, random_bytes, setup, vpath};

fn garbage_cases() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("bad.zip", b"PK but not really a zip archive".to_vec()),
        ("bad.tar", vec![0xab; 2048]),
        ("short.tar", b"not a tarball".to_vec()),
        ("partial.tar", vec![0xab; 511]),
        ("bad.tar.gz", random_bytes(300, 3)),
        ("bad.txt.gz", b"plain text pretending".to_vec()),
    ]
}

#[test]
fn test_reading_garbage_is_corruption() {
    let (dir, fs) = setup();
    for (name, bytes) in garbage_cases() {
        std::fs::write(dir.path().join(name), &bytes).unwrap();

        let err = fs.list_dir(&vpath(&dir, name)).unwrap_err();
        assert!(err.is_corruption(), "{}: {:?}", name, err);
        assert!(err.path().unwrap().ends_with(name));

        let err = fs.read(&vpath(&dir, &format!("{}/member", name))).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive { .. }), "{}: {:?}", name, err);
    }
}

#[test]
fn test_writing_into_garbage_leaves_it_alone() {
    let (dir, fs) = setup();
    for (name, bytes) in garbage_cases() {
        std::fs::write(dir.path().join(name), &bytes).unwrap();

        let member = if name.ends_with(".txt.gz") {
            vpath(&dir, &format!("{}/bad.txt", name))
        } else {
            vpath(&dir, &format!("{}/new.txt", name))
        };
        let err = fs.write(&member, "data").unwrap_err();
        assert!(err.is_corruption(), "{}: {:?}", name, err);
        assert_eq!(std::fs::read(dir.path().join(name)).unwrap(), bytes, "{} changed", name);
    }
    assert!(leftover_temp_files(&dir).is_empty());
}

#[test]
fn test_corrupt_nested_container() {
    let (dir, fs) = setup();
    fs.write(&vpath(&dir, "outer.zip/inner.tar"), vec![0xcdu8; 1024]).unwrap();

    let err = fs.list_dir(&vpath(&dir, "outer.zip/inner.tar")).unwrap_err();
    assert!(err.is_corruption());
    assert!(err.path().unwrap().ends_with("outer.zip/inner.tar"));
    assert!(fs.exists(&vpath(&dir, "outer.zip/inner.tar")).unwrap());
}

#[test]
fn test_empty_file_is_not_a_zip() {
    let (dir, fs) = setup();
    std::fs::write(dir.path().join("empty.zip"), b"").unwrap();
    assert!(fs.list_dir(&vpath(&dir, "empty.zip")).unwrap_err().is_corruption());
}

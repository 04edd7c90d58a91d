//! Write-then-read round trips through every built-in format.

mod common;

use arcfs::{ArchiveFs, Config, Error, ZipMethod};
use common::{multi_member_formats, random_bytes, setup, setup_with, single_member_formats, vpath};

fn payloads() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("empty.bin", Vec::new()),
        ("one.bin", vec![0x42]),
        ("text.txt", b"The quick brown fox jumps over the lazy dog\n".to_vec()),
        ("large.bin", random_bytes(1024 * 1024 + 17, 7)),
    ]
}

#[test]
fn test_multi_member_round_trip() {
    let (dir, fs) = setup();
    for format in multi_member_formats() {
        let archive = vpath(&dir, &format!("archive.{}", format));
        for (name, data) in payloads() {
            fs.write(&format!("{}/{}", archive, name), &data).unwrap();
        }

        // A fresh instance sees only what reached the disk
        let fresh = ArchiveFs::with_config(Config::default());
        for (name, data) in payloads() {
            let read = fresh.read(&format!("{}/{}", archive, name)).unwrap();
            assert_eq!(read.len(), data.len(), "{} in {}", name, format);
            assert!(read == data, "{} in {} differs", name, format);
        }
        assert_eq!(
            fresh.list_dir(&archive).unwrap(),
            vec!["empty.bin", "large.bin", "one.bin", "text.txt"],
            "listing of {}",
            format
        );
    }
}

#[test]
fn test_unicode_member_names() {
    let (dir, fs) = setup();
    for format in ["zip", "tar", "tar.gz"] {
        let archive = vpath(&dir, &format!("unicode.{}", format));
        let member = format!("{}/données/résumé 履歴.txt", archive);
        fs.write(&member, "naïve café").unwrap();

        assert_eq!(fs.read_to_string(&member).unwrap(), "naïve café");
        assert_eq!(fs.list_dir(&archive).unwrap(), vec!["données"]);
        assert_eq!(
            fs.list_dir(&format!("{}/données", archive)).unwrap(),
            vec!["résumé 履歴.txt"]
        );
    }
}

#[test]
fn test_single_member_round_trip() {
    let (dir, fs) = setup();
    for format in single_member_formats() {
        let container = vpath(&dir, &format!("report.csv.{}", format));
        let member = format!("{}/report.csv", container);
        for (_, data) in payloads() {
            fs.write(&member, &data).unwrap();
            assert!(fs.read(&member).unwrap() == data, "payload in {}", format);
        }
        assert_eq!(fs.list_dir(&container).unwrap(), vec!["report.csv"]);

        let info = fs.get_info(&member).unwrap();
        assert_eq!(info.size, 1024 * 1024 + 17);
        assert!(!info.is_dir);
    }
}

#[test]
fn test_single_member_rejects_other_names() {
    let (dir, fs) = setup();
    let container = vpath(&dir, "data.json.gz");
    fs.write(&format!("{}/data.json", container), "{}").unwrap();

    assert!(matches!(
        fs.write(&format!("{}/other.json", container), "{}"),
        Err(Error::EntryNotFound { .. })
    ));
    assert!(matches!(
        fs.mkdir(&format!("{}/dir", container), false),
        Err(Error::UnsupportedOperation { .. })
    ));
    assert_eq!(fs.read_to_string(&format!("{}/data.json", container)).unwrap(), "{}");
}

#[test]
fn test_removing_single_member_removes_container() {
    let (dir, fs) = setup();
    let container = vpath(&dir, "notes.txt.gz");
    fs.write(&format!("{}/notes.txt", container), "bye").unwrap();
    fs.remove(&format!("{}/notes.txt", container)).unwrap();
    assert!(!dir.path().join("notes.txt.gz").exists());
}

#[test]
fn test_stored_zip_method() {
    let (dir, fs) = setup_with(Config::default().zip_method(ZipMethod::Stored));
    let data = vec![b'a'; 10_000];
    fs.write(&vpath(&dir, "stored.zip/a.txt"), &data).unwrap();

    let size = std::fs::metadata(dir.path().join("stored.zip")).unwrap().len();
    assert!(size > 10_000, "stored entries are not compressed");
    assert_eq!(fs.read(&vpath(&dir, "stored.zip/a.txt")).unwrap(), data);
}

#[test]
fn test_overwrite_and_append() {
    let (dir, fs) = setup();
    let member = vpath(&dir, "log.tar.gz/app.log");
    fs.write(&member, "first\n").unwrap();
    fs.write(&member, "second\n").unwrap();
    fs.append(&member, "third\n").unwrap();
    assert_eq!(fs.read_to_string(&member).unwrap(), "second\nthird\n");
    assert_eq!(fs.list_dir(&vpath(&dir, "log.tar.gz")).unwrap(), vec!["app.log"]);
}

#[test]
fn test_invalid_utf8_is_an_encoding_error() {
    let (dir, fs) = setup();
    let member = vpath(&dir, "bin.zip/blob");
    fs.write(&member, [0xffu8, 0xfe, 0x00]).unwrap();
    assert!(matches!(
        fs.read_to_string(&member),
        Err(Error::EncodingError { .. })
    ));
}

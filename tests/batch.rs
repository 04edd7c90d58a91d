//! Batches and transactions over many edits.

mod common;

use arcfs::Error;
use common::{leftover_temp_files, setup, vpath};

#[test]
fn test_fifty_writes_in_a_batch() {
    let (dir, fs) = setup();
    let mut batch = fs.batch();
    for i in 0..50 {
        let member = vpath(&dir, &format!("many.zip/dir{}/file{:02}.txt", i % 5, i));
        batch.write(&member, format!("content {}", i)).unwrap();
    }
    let touched = batch.commit();
    assert_eq!(touched, vec![dir.path().join("many.zip")]);

    for i in 0..50 {
        let member = vpath(&dir, &format!("many.zip/dir{}/file{:02}.txt", i % 5, i));
        assert_eq!(fs.read_to_string(&member).unwrap(), format!("content {}", i));
    }
    assert_eq!(fs.list_dir(&vpath(&dir, "many.zip")).unwrap().len(), 5);
    assert_eq!(fs.list_dir(&vpath(&dir, "many.zip/dir3")).unwrap().len(), 10);
}

#[test]
fn test_batch_stops_recording_failed_operations() {
    let (dir, fs) = setup();
    let mut batch = fs.batch();
    batch.write(&vpath(&dir, "ok.tar/a"), "a").unwrap();
    assert!(batch.remove(&vpath(&dir, "missing.zip/a")).is_err());
    batch.mkdir(&vpath(&dir, "plain"), false).unwrap();

    let touched = batch.touched();
    assert!(touched.contains(&dir.path().join("ok.tar")));
    assert!(!touched.contains(&dir.path().join("missing.zip")));
}

#[test]
fn test_transaction_spanning_archives() {
    let (dir, fs) = setup();
    let first = vpath(&dir, "first.zip");
    let second = vpath(&dir, "second.tar.gz");
    fs.write(&format!("{}/keep.txt", first), "v1").unwrap();
    let before = std::fs::read(dir.path().join("first.zip")).unwrap();

    let result: Result<(), Error> = fs.transaction(&[first.as_str(), second.as_str()], |fs| {
        fs.write(&format!("{}/keep.txt", first), "v2")?;
        fs.write(&format!("{}/new.txt", second), "new")?;
        fs.move_path(&format!("{}/keep.txt", first), &format!("{}/moved.txt", second))?;
        fs.read(&format!("{}/absent", first))?;
        Ok(())
    });

    assert!(matches!(result, Err(Error::EntryNotFound { .. })));
    assert_eq!(std::fs::read(dir.path().join("first.zip")).unwrap(), before);
    assert!(!dir.path().join("second.tar.gz").exists());
    assert!(leftover_temp_files(&dir).is_empty());
    assert_eq!(fs.read_to_string(&format!("{}/keep.txt", first)).unwrap(), "v1");
}

#[test]
fn test_transaction_returns_body_value() {
    let (dir, fs) = setup();
    let archive = vpath(&dir, "count.zip");
    let written = fs
        .transaction(&[archive.as_str()], |fs| {
            for i in 0..3 {
                fs.write(&format!("{}/{}.txt", archive, i), "x")?;
            }
            fs.list_dir(&archive).map(|names| names.len())
        })
        .unwrap();
    assert_eq!(written, 3);
    assert!(leftover_temp_files(&dir).is_empty());
}

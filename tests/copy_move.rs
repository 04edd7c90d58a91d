//! Copying and moving between disk and archives of different formats.

mod common;

use arcfs::{ArchiveFs, Error};
use common::{random_bytes, setup, vpath};
use tempfile::TempDir;

fn populate(dir: &TempDir, fs: &ArchiveFs) {
    fs.write(&vpath(dir, "src.zip/docs/readme.md"), "# docs").unwrap();
    fs.write(&vpath(dir, "src.zip/docs/api/index.html"), "<html>").unwrap();
    fs.write(&vpath(dir, "src.zip/docs/blob.bin"), random_bytes(50_000, 5)).unwrap();
    fs.write(&vpath(dir, "src.zip/top.txt"), "top").unwrap();
}

#[test]
fn test_copy_file_across_formats() {
    let (dir, fs) = setup();
    populate(&dir, &fs);
    let src = vpath(&dir, "src.zip/docs/blob.bin");
    let data = fs.read(&src).unwrap();

    for dst in ["copy.tar.gz/blob.bin", "copy.tgz/a/b/blob.bin", "blob.bin.gz/blob.bin", "plain.bin"] {
        fs.copy(&src, &vpath(&dir, dst)).unwrap();
        assert!(fs.read(&vpath(&dir, dst)).unwrap() == data, "copy to {}", dst);
    }
    assert!(fs.read(&src).unwrap() == data);
}

#[test]
fn test_copy_into_existing_directory() {
    let (dir, fs) = setup();
    populate(&dir, &fs);
    fs.mkdir(&vpath(&dir, "dst.tar/inbox"), true).unwrap();

    fs.copy(&vpath(&dir, "src.zip/top.txt"), &vpath(&dir, "dst.tar/inbox")).unwrap();
    assert_eq!(fs.read_to_string(&vpath(&dir, "dst.tar/inbox/top.txt")).unwrap(), "top");

    std::fs::create_dir(dir.path().join("shelf")).unwrap();
    fs.copy(&vpath(&dir, "src.zip"), &vpath(&dir, "shelf")).unwrap();
    assert_eq!(
        std::fs::read(dir.path().join("shelf/src.zip")).unwrap(),
        std::fs::read(dir.path().join("src.zip")).unwrap()
    );
    assert_eq!(
        fs.read_to_string(&vpath(&dir, "shelf/src.zip/docs/readme.md")).unwrap(),
        "# docs"
    );
}

#[test]
fn test_copy_directory_tree() {
    let (dir, fs) = setup();
    populate(&dir, &fs);

    fs.copy(&vpath(&dir, "src.zip/docs"), &vpath(&dir, "tree.tar.gz/copied")).unwrap();
    assert_eq!(
        fs.list_dir(&vpath(&dir, "tree.tar.gz/copied")).unwrap(),
        vec!["api", "blob.bin", "readme.md"]
    );
    assert_eq!(
        fs.read_to_string(&vpath(&dir, "tree.tar.gz/copied/api/index.html")).unwrap(),
        "<html>"
    );

    // Out of the archive onto disk
    fs.copy(&vpath(&dir, "src.zip/docs"), &vpath(&dir, "extracted")).unwrap();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("extracted/api/index.html")).unwrap(),
        "<html>"
    );
}

#[test]
fn test_copy_into_itself_rejected() {
    let (dir, fs) = setup();
    populate(&dir, &fs);
    assert!(matches!(
        fs.copy(&vpath(&dir, "src.zip/docs"), &vpath(&dir, "src.zip/docs/again")),
        Err(Error::InvalidPath(_))
    ));
    assert!(!fs.exists(&vpath(&dir, "src.zip/docs/again")).unwrap());
}

#[test]
fn test_copy_missing_source() {
    let (dir, fs) = setup();
    populate(&dir, &fs);
    let err = fs
        .copy(&vpath(&dir, "src.zip/nope"), &vpath(&dir, "out.txt"))
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!dir.path().join("out.txt").exists());
}

#[test]
fn test_move_file_between_archives() {
    let (dir, fs) = setup();
    populate(&dir, &fs);

    fs.move_path(&vpath(&dir, "src.zip/top.txt"), &vpath(&dir, "other.tar/top.txt")).unwrap();
    assert!(!fs.exists(&vpath(&dir, "src.zip/top.txt")).unwrap());
    assert_eq!(fs.read_to_string(&vpath(&dir, "other.tar/top.txt")).unwrap(), "top");
    assert_eq!(fs.list_dir(&vpath(&dir, "src.zip")).unwrap(), vec!["docs"]);
}

#[test]
fn test_move_directory_out_of_archive() {
    let (dir, fs) = setup();
    populate(&dir, &fs);

    fs.move_path(&vpath(&dir, "src.zip/docs"), &vpath(&dir, "docs")).unwrap();
    assert_eq!(fs.list_dir(&vpath(&dir, "src.zip")).unwrap(), vec!["top.txt"]);
    assert!(dir.path().join("docs/api/index.html").is_file());
    assert_eq!(std::fs::read_to_string(dir.path().join("docs/readme.md")).unwrap(), "# docs");
}

#[test]
fn test_move_between_plain_paths() {
    let (dir, fs) = setup();
    fs.write(&vpath(&dir, "a.txt"), "a").unwrap();
    std::fs::create_dir(dir.path().join("folder")).unwrap();

    fs.move_path(&vpath(&dir, "a.txt"), &vpath(&dir, "folder")).unwrap();
    assert!(dir.path().join("folder/a.txt").is_file());
    assert!(!dir.path().join("a.txt").exists());

    fs.move_path(&vpath(&dir, "folder/a.txt"), &vpath(&dir, "packed.zip/a.txt")).unwrap();
    assert_eq!(fs.read_to_string(&vpath(&dir, "packed.zip/a.txt")).unwrap(), "a");
    assert!(!dir.path().join("folder/a.txt").exists());
}

#[test]
fn test_copy_container_same_format_copies_bytes() {
    let (dir, fs) = setup();
    populate(&dir, &fs);

    fs.copy(&vpath(&dir, "src.zip"), &vpath(&dir, "same.zip")).unwrap();
    assert_eq!(
        std::fs::read(dir.path().join("same.zip")).unwrap(),
        std::fs::read(dir.path().join("src.zip")).unwrap()
    );
    assert_eq!(fs.list_dir(&vpath(&dir, "same.zip")).unwrap(), vec!["docs", "top.txt"]);

    // Aliases share a codec, so this is a byte copy too
    fs.write(&vpath(&dir, "logs.tar.gz/a.log"), "a").unwrap();
    fs.copy(&vpath(&dir, "logs.tar.gz"), &vpath(&dir, "logs.tgz")).unwrap();
    assert_eq!(
        std::fs::read(dir.path().join("logs.tgz")).unwrap(),
        std::fs::read(dir.path().join("logs.tar.gz")).unwrap()
    );
}

#[test]
fn test_copy_container_across_formats() {
    let (dir, fs) = setup();
    populate(&dir, &fs);
    let blob = fs.read(&vpath(&dir, "src.zip/docs/blob.bin")).unwrap();

    for dst in ["b.tar", "b.tar.gz", "nested.zip/inner/b.tgz"] {
        fs.copy(&vpath(&dir, "src.zip"), &vpath(&dir, dst)).unwrap();
        assert_eq!(fs.list_dir(&vpath(&dir, dst)).unwrap(), vec!["docs", "top.txt"], "{}", dst);
        assert_eq!(
            fs.list_dir(&vpath(&dir, &format!("{}/docs", dst))).unwrap(),
            vec!["api", "blob.bin", "readme.md"]
        );
        assert_eq!(fs.read_to_string(&vpath(&dir, &format!("{}/top.txt", dst))).unwrap(), "top");
        assert!(fs.read(&vpath(&dir, &format!("{}/docs/blob.bin", dst))).unwrap() == blob);
    }
    assert_eq!(fs.list_dir(&vpath(&dir, "src.zip")).unwrap(), vec!["docs", "top.txt"]);

    // And back from tar into zip
    fs.copy(&vpath(&dir, "b.tar.gz"), &vpath(&dir, "back.zip")).unwrap();
    assert_eq!(
        fs.read_to_string(&vpath(&dir, "back.zip/docs/api/index.html")).unwrap(),
        "<html>"
    );
}

#[test]
fn test_copy_container_into_existing_container_of_other_format() {
    let (dir, fs) = setup();
    populate(&dir, &fs);
    fs.write(&vpath(&dir, "existing.tar/keep.txt"), "kept").unwrap();

    fs.copy(&vpath(&dir, "src.zip"), &vpath(&dir, "existing.tar")).unwrap();
    assert_eq!(
        fs.list_dir(&vpath(&dir, "existing.tar")).unwrap(),
        vec!["docs", "keep.txt", "top.txt"]
    );
    assert_eq!(fs.read_to_string(&vpath(&dir, "existing.tar/keep.txt")).unwrap(), "kept");
    assert_eq!(fs.read_to_string(&vpath(&dir, "existing.tar/top.txt")).unwrap(), "top");
}

#[test]
fn test_copy_single_member_containers() {
    let (dir, fs) = setup();
    fs.write(&vpath(&dir, "notes.txt.gz/notes.txt"), "gzipped").unwrap();

    fs.copy(&vpath(&dir, "notes.txt.gz"), &vpath(&dir, "notes.zip")).unwrap();
    assert_eq!(fs.list_dir(&vpath(&dir, "notes.zip")).unwrap(), vec!["notes.txt"]);
    assert_eq!(fs.read_to_string(&vpath(&dir, "notes.zip/notes.txt")).unwrap(), "gzipped");

    #[cfg(feature = "bzip2")]
    {
        fs.copy(&vpath(&dir, "notes.txt.gz"), &vpath(&dir, "renamed.bz2")).unwrap();
        assert_eq!(fs.list_dir(&vpath(&dir, "renamed.bz2")).unwrap(), vec!["renamed"]);
        assert_eq!(fs.read_to_string(&vpath(&dir, "renamed.bz2/renamed")).unwrap(), "gzipped");
    }

    populate(&dir, &fs);
    assert!(matches!(
        fs.copy(&vpath(&dir, "src.zip"), &vpath(&dir, "all.gz")),
        Err(Error::UnsupportedOperation { .. })
    ));
    assert!(!dir.path().join("all.gz").exists());
}

#[test]
fn test_move_container_across_formats() {
    let (dir, fs) = setup();
    populate(&dir, &fs);

    fs.move_path(&vpath(&dir, "src.zip"), &vpath(&dir, "moved.tar.gz")).unwrap();
    assert!(!dir.path().join("src.zip").exists());
    assert_eq!(fs.list_dir(&vpath(&dir, "moved.tar.gz")).unwrap(), vec!["docs", "top.txt"]);
    assert_eq!(
        fs.read_to_string(&vpath(&dir, "moved.tar.gz/docs/readme.md")).unwrap(),
        "# docs"
    );

    // Same format is a rename
    fs.move_path(&vpath(&dir, "moved.tar.gz"), &vpath(&dir, "moved.tgz")).unwrap();
    assert!(!dir.path().join("moved.tar.gz").exists());
    assert_eq!(fs.read_to_string(&vpath(&dir, "moved.tgz/top.txt")).unwrap(), "top");

    // A nested container moved out to disk under another format
    fs.copy(&vpath(&dir, "moved.tgz"), &vpath(&dir, "outer.zip/inner.tar")).unwrap();
    fs.move_path(&vpath(&dir, "outer.zip/inner.tar"), &vpath(&dir, "loose.zip")).unwrap();
    assert!(fs.list_dir(&vpath(&dir, "outer.zip")).unwrap().is_empty());
    assert_eq!(fs.list_dir(&vpath(&dir, "loose.zip")).unwrap(), vec!["docs", "top.txt"]);
}

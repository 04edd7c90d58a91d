//! Traversal and pattern matching across container boundaries.

mod common;

use arcfs::{ArchiveFs, WalkEntry};
use common::{setup, vpath};
use tempfile::TempDir;

fn populate(dir: &TempDir, fs: &ArchiveFs) {
    fs.write(&vpath(dir, "notes.txt"), "n").unwrap();
    fs.write(&vpath(dir, "site.zip/index.html"), "<p>").unwrap();
    fs.write(&vpath(dir, "site.zip/conf/app.conf"), "a=1").unwrap();
    fs.write(&vpath(dir, "site.zip/conf/logs.tar.gz/today.log"), "ok").unwrap();
    fs.write(&vpath(dir, "site.zip/conf/logs.tar.gz/old/2020.log"), "old").unwrap();
    fs.mkdir(&vpath(dir, "backups"), false).unwrap();
    fs.write(&vpath(dir, "backups/db.tar/db.conf"), "b=2").unwrap();
}

#[test]
fn test_walk_descends_into_archives() {
    let (dir, fs) = setup();
    populate(&dir, &fs);
    let root = dir.path().display().to_string();

    let entries: Vec<WalkEntry> = fs.walk(&root).map(Result::unwrap).collect();
    let roots: Vec<String> = entries
        .iter()
        .map(|e| e.root.strip_prefix(&root).unwrap_or(&e.root).to_string())
        .collect();
    assert_eq!(
        roots,
        vec![
            "",
            "/backups",
            "/backups/db.tar",
            "/site.zip",
            "/site.zip/conf",
            "/site.zip/conf/logs.tar.gz",
            "/site.zip/conf/logs.tar.gz/old",
        ]
    );

    assert_eq!(entries[0].dirs, vec!["backups", "site.zip"]);
    assert_eq!(entries[0].files, vec!["notes.txt"]);
    assert_eq!(entries[4].dirs, vec!["logs.tar.gz"]);
    assert_eq!(entries[4].files, vec!["app.conf"]);
    assert_eq!(entries[5].dirs, vec!["old"]);
    assert_eq!(entries[5].files, vec!["today.log"]);
}

#[test]
fn test_walk_restart() {
    let (dir, fs) = setup();
    populate(&dir, &fs);

    let mut walk = fs.walk(&vpath(&dir, "site.zip"));
    let first: Vec<_> = walk.by_ref().map(Result::unwrap).collect();
    assert!(walk.next().is_none());

    fs.write(&vpath(&dir, "site.zip/extra/file"), "x").unwrap();
    walk.restart();
    let second: Vec<_> = walk.map(Result::unwrap).collect();
    assert_eq!(second.len(), first.len() + 1);
    assert!(second[0].dirs.contains(&"extra".to_string()));
}

#[test]
fn test_walk_reports_unreadable_directories() {
    let (dir, fs) = setup();
    std::fs::write(dir.path().join("broken.zip"), b"garbage").unwrap();
    fs.write(&vpath(&dir, "good.tar/a"), "a").unwrap();

    let items: Vec<_> = fs.walk(&dir.path().display().to_string()).collect();
    assert_eq!(items.len(), 3);
    assert!(items[1].as_ref().unwrap_err().is_corruption());
    assert_eq!(items[2].as_ref().unwrap().files, vec!["a"]);
}

#[test]
fn test_walk_missing_start() {
    let (dir, fs) = setup();
    let items: Vec<_> = fs.walk(&vpath(&dir, "nothing.zip")).collect();
    assert_eq!(items.len(), 1);
    assert!(items[0].as_ref().unwrap_err().is_not_found());
}

#[test]
fn test_glob_across_archives() {
    let (dir, fs) = setup();
    populate(&dir, &fs);

    let confs = fs.glob(&vpath(&dir, "*.conf")).unwrap();
    assert_eq!(
        confs,
        vec![vpath(&dir, "backups/db.tar/db.conf"), vpath(&dir, "site.zip/conf/app.conf")]
    );

    let logs = fs.glob(&vpath(&dir, "site.zip/conf/*.tar.gz/*.log")).unwrap();
    assert_eq!(
        logs,
        vec![
            vpath(&dir, "site.zip/conf/logs.tar.gz/old/2020.log"),
            vpath(&dir, "site.zip/conf/logs.tar.gz/today.log"),
        ]
    );

    let single = fs.glob(&vpath(&dir, "site.zip/index.htm?")).unwrap();
    assert_eq!(single, vec![vpath(&dir, "site.zip/index.html")]);
}

#[test]
fn test_glob_without_wildcards() {
    let (dir, fs) = setup();
    populate(&dir, &fs);
    let exact = vpath(&dir, "site.zip/conf/app.conf");
    assert_eq!(fs.glob(&exact).unwrap(), vec![exact.clone()]);
    assert!(fs.glob(&vpath(&dir, "site.zip/conf/none.conf")).unwrap().is_empty());
    assert!(fs.glob(&vpath(&dir, "missing.zip/*")).unwrap().is_empty());
}

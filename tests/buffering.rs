//! Spilling buffers to disk must not change any result.

mod common;

use std::io::{Read, Seek, SeekFrom, Write};

use arcfs::{BufferedStream, Config};
use common::{multi_member_formats, random_bytes, setup_with, vpath};

#[test]
fn test_rollover_is_transparent() {
    let data = random_bytes(200_000, 11);
    let mut results = Vec::new();

    for threshold in [64, 64 * 1024 * 1024] {
        let (dir, fs) = setup_with(Config::default().buffer_threshold(threshold));
        let mut reads = Vec::new();
        for format in multi_member_formats() {
            let member = vpath(&dir, &format!("spill.{}/nested.zip/data.bin", format));
            fs.write(&member, &data).unwrap();
            fs.append(&member, b"tail").unwrap();
            reads.push(fs.read(&member).unwrap());
        }
        results.push(reads);
    }

    assert_eq!(results[0].len(), results[1].len());
    for (small, large) in results[0].iter().zip(&results[1]) {
        assert_eq!(small.len(), data.len() + 4);
        assert!(small == large, "spilled and in-memory results differ");
    }
}

#[test]
fn test_streamed_write_across_threshold() {
    let (dir, fs) = setup_with(Config::default().buffer_threshold(1024));
    let member = vpath(&dir, "stream.tar.gz/lines.txt");

    let mut expected = String::new();
    let mut file = fs.open(&member, "w").unwrap();
    for i in 0..5_000 {
        let line = format!("{:05} the same line again\n", i);
        file.write_all(line.as_bytes()).unwrap();
        expected.push_str(&line);
    }
    file.close().unwrap();

    assert_eq!(fs.read_to_string(&member).unwrap(), expected);
}

#[test]
fn test_stream_spills_and_keeps_position() {
    let mut stream = BufferedStream::with_threshold(16);
    stream.write_all(b"0123456789").unwrap();
    assert!(!stream.is_spilled());
    stream.write_all(b"abcdefghij").unwrap();
    assert!(stream.is_spilled());
    assert_eq!(stream.tell().unwrap(), 20);

    stream.seek(SeekFrom::Start(5)).unwrap();
    let mut rest = String::new();
    stream.read_to_string(&mut rest).unwrap();
    assert_eq!(rest, "56789abcdefghij");
    assert_eq!(stream.to_vec().unwrap(), b"0123456789abcdefghij");
    assert_eq!(stream.len().unwrap(), 20);
}

#[test]
fn test_spill_into_configured_temp_dir() {
    let scratch = tempfile::TempDir::new().unwrap();
    let config = Config::default()
        .buffer_threshold(8)
        .temp_dir(scratch.path());
    let mut stream = BufferedStream::with_config(&config);
    stream.write_all(&[7u8; 100]).unwrap();
    assert!(stream.is_spilled());
    assert_eq!(stream.to_vec().unwrap(), vec![7u8; 100]);
}

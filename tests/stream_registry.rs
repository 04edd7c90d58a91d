//! Process-wide stream bookkeeping.
//!
//! Kept in its own test binary: the registry is global, so streams created
//! by unrelated tests running in parallel would skew the counts.

use std::io::{Read, Write};

use arcfs::{BufferedStream, Error};

#[test]
fn test_flush_and_close_all() {
    let before = BufferedStream::open_count();

    let mut memory = BufferedStream::with_threshold(1024);
    memory.write_all(b"small").unwrap();
    let mut spilled = BufferedStream::with_threshold(4);
    spilled.write_all(b"large enough to spill").unwrap();
    assert!(spilled.is_spilled());

    let mut dropped = BufferedStream::with_threshold(1024);
    dropped.write_all(b"gone").unwrap();
    drop(dropped);

    assert_eq!(BufferedStream::open_count(), before + 2);
    assert_eq!(BufferedStream::flush_all(), before + 2);

    let mut closed_early = BufferedStream::with_threshold(1024);
    closed_early.close().unwrap();
    closed_early.close().unwrap();
    assert!(closed_early.is_closed());
    assert_eq!(BufferedStream::open_count(), before + 2);

    assert_eq!(BufferedStream::close_all(), before + 2);
    assert_eq!(BufferedStream::open_count(), 0);
    assert!(memory.is_closed());
    assert!(spilled.is_closed());

    // Owners learn about the close on their next operation
    let err = memory.write_all(b"more").unwrap_err();
    assert!(matches!(Error::from(err), Error::StreamClosed));
    let mut buf = [0u8; 4];
    assert!(spilled.read(&mut buf).is_err());
    assert!(matches!(memory.to_vec(), Err(Error::StreamClosed)));
    assert_eq!(BufferedStream::close_all(), 0);
}

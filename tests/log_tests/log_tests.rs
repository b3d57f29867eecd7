//! Tests for the append log
//!
//! These tests verify:
//! - Appends report contiguous byte positions
//! - Exact-range reads return the appended bytes
//! - Line streaming reports offsets
//! - Torn tails are isolated before the next append

use std::fs::{self, OpenOptions};
use std::io::Write;

use filedb::config::SyncStrategy;
use filedb::log::AppendLog;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_log() -> (TempDir, AppendLog) {
    let temp_dir = TempDir::new().unwrap();
    let log = AppendLog::new(&temp_dir.path().join("people.db"), SyncStrategy::EveryWrite);
    (temp_dir, log)
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_append_creates_file() {
    let (_temp, log) = setup_temp_log();
    assert!(!log.path().exists());
    assert_eq!(log.len().unwrap(), 0);

    log.append(b"{\"_id\":\"1\"}\n").unwrap();

    assert!(log.path().exists());
    assert!(!log.is_empty().unwrap());
}

#[test]
fn test_append_positions_are_contiguous() {
    let (_temp, log) = setup_temp_log();

    let first = log.append(b"{\"_id\":\"1\",\"name\":\"A\"}\n").unwrap();
    let second = log.append(b"{\"_id\":\"2\"}\n").unwrap();

    assert_eq!(first.offset, 0);
    assert_eq!(first.length, 23);
    assert_eq!(second.offset, 23);
    assert_eq!(second.length, 12);
    assert_eq!(log.len().unwrap(), 35);
}

#[test]
fn test_writer_holds_lock_across_appends() {
    let (_temp, log) = setup_temp_log();

    let mut writer = log.writer().unwrap();
    let a = writer.append(b"a\n").unwrap();
    let b = writer.append(b"bb\n").unwrap();
    drop(writer);

    assert_eq!((a.offset, a.length), (0, 2));
    assert_eq!((b.offset, b.length), (2, 3));
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn test_read_at_returns_exact_bytes() {
    let (_temp, log) = setup_temp_log();
    log.append(b"{\"_id\":\"1\"}\n").unwrap();
    let pos = log.append(b"{\"_id\":\"2\",\"x\":1}\n").unwrap();

    let bytes = log.read_at(pos.offset, pos.length).unwrap().unwrap();

    assert_eq!(bytes, b"{\"_id\":\"2\",\"x\":1}\n");
}

#[test]
fn test_read_at_past_end_is_none() {
    let (_temp, log) = setup_temp_log();
    log.append(b"{\"_id\":\"1\"}\n").unwrap();

    assert_eq!(log.read_at(5, 100).unwrap(), None);
    assert_eq!(log.read_at(1000, 1).unwrap(), None);
}

#[test]
fn test_lines_report_offsets() {
    let (_temp, log) = setup_temp_log();
    log.append(b"one\n").unwrap();
    log.append(b"two!\n").unwrap();
    log.append(b"3\n").unwrap();

    let lines: Vec<(u64, Vec<u8>)> = log
        .lines()
        .unwrap()
        .map(|l| {
            let l = l.unwrap();
            (l.offset, l.bytes)
        })
        .collect();

    assert_eq!(
        lines,
        vec![
            (0, b"one\n".to_vec()),
            (4, b"two!\n".to_vec()),
            (9, b"3\n".to_vec()),
        ]
    );

    let tail: Vec<u64> = log.lines_from(4).unwrap().map(|l| l.unwrap().offset).collect();
    assert_eq!(tail, vec![4, 9]);
}

// =============================================================================
// Torn Tail Tests
// =============================================================================

#[test]
fn test_torn_tail_is_terminated_before_append() {
    let (_temp, log) = setup_temp_log();
    log.append(b"{\"_id\":\"1\"}\n").unwrap();

    // simulate a crash mid-write
    let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
    file.write_all(b"{\"_id\":\"2\",\"na").unwrap();
    drop(file);

    let pos = log.append(b"{\"_id\":\"3\"}\n").unwrap();

    let contents = fs::read(log.path()).unwrap();
    assert_eq!(
        contents,
        b"{\"_id\":\"1\"}\n{\"_id\":\"2\",\"na\n{\"_id\":\"3\"}\n".to_vec()
    );
    assert_eq!(pos.offset, 27);
    assert_eq!(
        log.read_at(pos.offset, pos.length).unwrap().unwrap(),
        b"{\"_id\":\"3\"}\n"
    );
}

#[test]
fn test_final_line_without_newline_is_streamed() {
    let (_temp, log) = setup_temp_log();
    fs::write(log.path(), b"a\nb").unwrap();

    let lines: Vec<Vec<u8>> = log.lines().unwrap().map(|l| l.unwrap().bytes).collect();

    assert_eq!(lines, vec![b"a\n".to_vec(), b"b".to_vec()]);
}

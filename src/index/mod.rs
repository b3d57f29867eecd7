//! Offset Index Module
//!
//! Per-table cache mapping record id → byte range of its newest version.
//!
//! ## Responsibilities
//! - Append one entry per log append (exclusive lock)
//! - Load a snapshot on demand (never cached across calls)
//! - Detect a stale index and rebuild it from the log
//!
//! ## File Format
//! ```text
//! 1:0:34
//! 2:34:34
//! 1:68:39        ← highest offset for "1" wins
//! 2:107:52
//! ```
//! The file is a pure cache: deleting it loses nothing but the fast path.
//!
//! ## Currency
//! Entries must tile the log: sorted by offset, each one starts where the
//! previous one ends. Bytes between entries (and after the last one) may only
//! hold undecodable lines. Anything else, such as an entry lost from the
//! middle of the file, marks the index stale.

mod entry;

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tempfile::NamedTempFile;

use crate::config::SyncStrategy;
use crate::error::Result;
use crate::log::AppendLog;
use crate::record::decode_line;
use crate::table::{parent_dir, replace_file};

pub use entry::IndexEntry;

/// Byte range of the authoritative version of one id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexLocation {
    pub offset: u64,
    pub length: u64,
}

/// Handle to a table's offset index file
#[derive(Debug, Clone)]
pub struct OffsetIndex {
    path: PathBuf,
    sync_strategy: SyncStrategy,
}

/// Summary of a rebuild pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// Lines read from the log
    pub lines_scanned: u64,
    /// Entries written to the new index
    pub entries_written: u64,
    /// Lines that did not decode and got no entry
    pub lines_skipped: u64,
}

impl OffsetIndex {
    pub fn new(path: &Path, sync_strategy: SyncStrategy) -> Self {
        Self {
            path: path.to_path_buf(),
            sync_strategy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one `id:offset:length` entry under an exclusive lock
    pub fn append_entry(&self, entry: &IndexEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        FileExt::lock_exclusive(&file)?;
        let result = write_entry(&mut file, entry, self.sync_strategy);
        let _ = FileExt::unlock(&file);

        result
    }

    /// Read the whole index into a snapshot; the highest offset per id wins
    ///
    /// A missing file yields an empty snapshot.
    pub fn load(&self) -> Result<IndexSnapshot> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(IndexSnapshot::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut snapshot = IndexSnapshot::default();
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(_) => {
                    snapshot.malformed_lines += 1;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match IndexEntry::parse(line) {
                Some(entry) => snapshot.insert(entry),
                None => snapshot.malformed_lines += 1,
            }
        }

        Ok(snapshot)
    }

    /// Load a snapshot that is consistent with `log`, rebuilding if stale
    ///
    /// Returns the snapshot and whether a rebuild happened.
    pub fn load_current(&self, log: &AppendLog) -> Result<(IndexSnapshot, bool)> {
        let snapshot = self.load()?;
        if snapshot.is_current(log)? {
            return Ok((snapshot, false));
        }

        tracing::debug!(index = %self.path.display(), "index stale, rebuilding");
        self.rebuild(log)?;
        Ok((self.load()?, true))
    }

    /// Rewrite the index from a full scan of `log`
    ///
    /// Writes one entry per decodable line in file order (duplicates per id
    /// are kept) into a temporary file, then renames it over the index. The
    /// log's exclusive lock is held throughout so no append can write an
    /// entry into the file being replaced.
    pub fn rebuild(&self, log: &AppendLog) -> Result<RebuildStats> {
        let _writer = log.writer()?;
        let mut stats = RebuildStats::default();
        let tmp = NamedTempFile::new_in(parent_dir(&self.path))?;
        let mut out = BufWriter::new(tmp);

        for line in log.lines()? {
            let line = line?;
            stats.lines_scanned += 1;

            match decode_line(&line.bytes) {
                Ok(record) => {
                    let entry = IndexEntry::new(record.id(), line.offset, line.len());
                    writeln!(out, "{}", entry)?;
                    stats.entries_written += 1;
                }
                Err(e) => {
                    stats.lines_skipped += 1;
                    tracing::warn!(offset = line.offset, error = %e, "skipping undecodable log line");
                }
            }
        }

        let tmp = out.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        replace_file(tmp, &self.path)?;

        tracing::info!(
            index = %self.path.display(),
            lines = stats.lines_scanned,
            entries = stats.entries_written,
            skipped = stats.lines_skipped,
            "index rebuilt"
        );

        Ok(stats)
    }
}

fn write_entry(file: &mut File, entry: &IndexEntry, sync: SyncStrategy) -> Result<()> {
    file.write_all(format!("{}\n", entry).as_bytes())?;
    file.flush()?;
    if sync == SyncStrategy::EveryWrite {
        file.sync_data()?;
    }
    Ok(())
}

// =============================================================================
// Snapshot
// =============================================================================

/// In-memory view of the index at load time
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    /// id → newest (highest offset) location
    entries: HashMap<String, IndexLocation>,
    /// Every distinct entry keyed by offset
    by_offset: BTreeMap<u64, IndexEntry>,
    /// Highest byte position referenced by any entry
    covered_end: u64,
    malformed_lines: u64,
    /// Entries sharing an offset but disagreeing on id or length
    conflicts: u64,
}

impl IndexSnapshot {
    fn insert(&mut self, entry: IndexEntry) {
        self.covered_end = self.covered_end.max(entry.end());

        let location = IndexLocation {
            offset: entry.offset,
            length: entry.length,
        };
        match self.entries.get(&entry.id) {
            Some(current) if current.offset >= entry.offset => {}
            _ => {
                self.entries.insert(entry.id.clone(), location);
            }
        }

        match self.by_offset.get(&entry.offset) {
            Some(existing) if *existing == entry => {}
            Some(_) => self.conflicts += 1,
            None => {
                self.by_offset.insert(entry.offset, entry);
            }
        }
    }

    /// Authoritative location for `id`
    pub fn get(&self, id: &str) -> Option<IndexLocation> {
        self.entries.get(id).copied()
    }

    /// The entry starting exactly at `offset`, whichever id it names
    pub fn entry_at(&self, offset: u64) -> Option<&IndexEntry> {
        self.by_offset.get(&offset)
    }

    /// Number of distinct ids
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn covered_end(&self) -> u64 {
        self.covered_end
    }

    pub fn malformed_lines(&self) -> u64 {
        self.malformed_lines
    }

    /// Whether this snapshot accounts for every record in `log`
    ///
    /// Stale when any index line is malformed or conflicting, when entries
    /// overlap or point past the end of the log, or when a decodable line
    /// sits outside every entry. Undecodable lines (a torn write) may fill
    /// the gaps.
    pub fn is_current(&self, log: &AppendLog) -> Result<bool> {
        if self.malformed_lines > 0 || self.conflicts > 0 {
            return Ok(false);
        }

        let log_len = log.len()?;
        if self.covered_end > log_len {
            return Ok(false);
        }

        let mut position = 0u64;
        for entry in self.by_offset.values() {
            if entry.offset < position {
                return Ok(false);
            }
            if entry.offset > position && !only_undecodable(log, position, Some(entry.offset))? {
                return Ok(false);
            }
            position = entry.end();
        }

        if position < log_len && !only_undecodable(log, position, None)? {
            return Ok(false);
        }
        Ok(true)
    }
}

/// Whether the lines from `start` hold no record
///
/// With `end` set, the lines must also stop exactly at that boundary.
fn only_undecodable(log: &AppendLog, start: u64, end: Option<u64>) -> Result<bool> {
    for line in log.lines_from(start)? {
        let line = line?;
        if let Some(end) = end {
            if line.offset >= end {
                return Ok(line.offset == end);
            }
            if line.offset + line.len() > end {
                return Ok(false);
            }
        }
        if decode_line(&line.bytes).is_ok() {
            return Ok(false);
        }
    }
    Ok(true)
}

//! Compactor
//!
//! Rewrites a table so its log holds exactly one line per live record.
//!
//! ## Steps
//! 1. Read the whole log, remembering the newest line per id
//! 2. Write every newest line that is not a tombstone to a temporary log,
//!    and a matching `id:offset:length` entry to a temporary index
//!    (offsets restart at zero, records keep the order of their newest
//!    version)
//! 3. Rename the temporary log over the log, then the temporary index over
//!    the index
//!
//! ## Known gaps
//! - No lock is held across the whole pass. Appends that land after step 1
//!   has read past them are lost when the log is replaced.
//! - The two renames are not atomic together. A crash between them leaves a
//!   new log next to the old index; `rebuild_index` restores consistency.
//!   Lookups and scans also rebuild when they notice the index is behind.

use std::collections::HashMap;
use std::io::{BufWriter, Write};

use tempfile::NamedTempFile;

use crate::error::Result;
use crate::index::IndexEntry;
use crate::record::decode_line;
use crate::table::{parent_dir, replace_file, TableFiles};

/// Summary of one compaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Lines read from the old log
    pub lines_scanned: u64,
    /// Live records written to the new log
    pub records_kept: u64,
    /// Ids whose newest version was a tombstone
    pub tombstones_dropped: u64,
    /// Older versions replaced by a newer one
    pub versions_superseded: u64,
    /// Lines that did not decode
    pub lines_skipped: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Newest version of one id seen during the first pass
struct Newest {
    offset: u64,
    line: Vec<u8>,
    tombstone: bool,
}

/// Compact `table` in place
///
/// The table must exist.
pub fn compact(table: &TableFiles) -> Result<CompactionStats> {
    let log = table.log();
    let mut stats = CompactionStats {
        bytes_before: log.len()?,
        ..Default::default()
    };

    // Pass 1: newest line per id
    let mut newest: HashMap<String, Newest> = HashMap::new();
    for line in log.lines()? {
        let line = line?;
        stats.lines_scanned += 1;

        let record = match decode_line(&line.bytes) {
            Ok(record) => record,
            Err(e) => {
                stats.lines_skipped += 1;
                tracing::warn!(offset = line.offset, error = %e, "dropping undecodable line");
                continue;
            }
        };

        let previous = newest.insert(
            record.id().to_string(),
            Newest {
                offset: line.offset,
                line: line.bytes,
                tombstone: record.is_tombstone(),
            },
        );
        if previous.is_some() {
            stats.versions_superseded += 1;
        }
    }

    let mut survivors: Vec<(String, Newest)> = newest.into_iter().collect();
    survivors.sort_by_key(|(_, version)| version.offset);

    // Pass 2: write live versions and their index entries
    let dir = parent_dir(table.data_path());
    let mut data_out = BufWriter::new(NamedTempFile::new_in(dir)?);
    let mut index_out = BufWriter::new(NamedTempFile::new_in(dir)?);
    let mut offset = 0u64;

    for (id, mut version) in survivors {
        if version.tombstone {
            stats.tombstones_dropped += 1;
            continue;
        }
        if version.line.last() != Some(&b'\n') {
            version.line.push(b'\n');
        }

        let length = version.line.len() as u64;
        data_out.write_all(&version.line)?;
        writeln!(index_out, "{}", IndexEntry::new(id, offset, length))?;

        offset += length;
        stats.records_kept += 1;
    }
    stats.bytes_after = offset;

    let data_tmp = data_out.into_inner().map_err(|e| e.into_error())?;
    let index_tmp = index_out.into_inner().map_err(|e| e.into_error())?;
    data_tmp.as_file().sync_all()?;
    index_tmp.as_file().sync_all()?;

    replace_file(data_tmp, table.data_path())?;
    replace_file(index_tmp, table.index_path())?;

    tracing::info!(
        table = table.name(),
        kept = stats.records_kept,
        tombstones = stats.tombstones_dropped,
        superseded = stats.versions_superseded,
        skipped = stats.lines_skipped,
        bytes_before = stats.bytes_before,
        bytes_after = stats.bytes_after,
        "table compacted"
    );

    Ok(stats)
}
